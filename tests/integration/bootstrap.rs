//! Bootstrap sentence tests

use jsm::repl::bootstrap::{argv_literal, quote, PROFILE_SCRIPT};
use jsm::repl::{Bootstrap, StartupMode};
use std::path::Path;

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn test_default_mode_runs_profile() {
    let boot = Bootstrap::new("/opt/j/bin/jsm", &[], Path::new("/opt/j/bin"));
    assert_eq!(boot.mode(), StartupMode::Profile);
    assert_eq!(
        boot.sentence(),
        "(3 : '0!:0 y')<BINPATH,'/profile.ijs'[ARGV_z_=:,<'/opt/j/bin/jsm'[BINPATH_z_=:'/opt/j/bin'"
    );
    assert!(boot.sentence().contains(PROFILE_SCRIPT));
}

#[test]
fn test_profile_flag_with_script() {
    let boot = Bootstrap::new(
        "jsm",
        &args(&["-jprofile", "boot.ijs", "x"]),
        Path::new("/j"),
    );
    assert_eq!(boot.mode(), StartupMode::ScriptProfile);
    assert_eq!(
        boot.sentence(),
        "(3 : '0!:0 y')2{ARGV[ARGV_z_=:'jsm';'-jprofile';'boot.ijs';'x'[BINPATH_z_=:'/j'"
    );
}

#[test]
fn test_profile_flag_alone_runs_nothing() {
    let boot = Bootstrap::new("jsm", &args(&["-jprofile"]), Path::new("/j"));
    assert_eq!(boot.mode(), StartupMode::NoProfile);
    assert_eq!(
        boot.sentence(),
        "i.0 0[ARGV_z_=:'jsm';'-jprofile'[BINPATH_z_=:'/j'"
    );
}

#[test]
fn test_quotes_are_doubled_everywhere() {
    let boot = Bootstrap::new(
        "jsm",
        &args(&["it's"]),
        Path::new("/home/o'brien/j"),
    );
    let sentence = boot.sentence();
    assert!(sentence.contains("[ARGV_z_=:'jsm';'it''s'["));
    assert!(sentence.ends_with("[BINPATH_z_=:'/home/o''brien/j'"));
}

#[test]
fn test_argv_keeps_program_first() {
    let boot = Bootstrap::new("prog", &args(&["a", "b"]), Path::new("/"));
    assert_eq!(boot.argv(), ["prog", "a", "b"]);
    assert_eq!(argv_literal(boot.argv()), "'prog';'a';'b'");
    assert_eq!(quote("'"), "''''");
}
