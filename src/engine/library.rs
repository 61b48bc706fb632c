//! Dynamically loaded engine library

use std::ffi::{c_char, c_int, c_void, CStr};
use std::io;
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{debug, info};

use super::{
    Callbacks, Engine, EngineArray, EngineError, EngineHandle, EngineInt, NounDescriptor,
};

/// Platform file name of the engine library.
#[cfg(all(windows, target_pointer_width = "64"))]
pub const LIBRARY_NAME: &str = "j.dll";
#[cfg(all(windows, not(target_pointer_width = "64")))]
pub const LIBRARY_NAME: &str = "j32.dll";
#[cfg(target_os = "macos")]
pub const LIBRARY_NAME: &str = "libj.dylib";
#[cfg(all(unix, not(target_os = "macos")))]
pub const LIBRARY_NAME: &str = "libj.so";

/// The engine library next to the host binary.
pub fn default_library_path() -> io::Result<PathBuf> {
    Ok(crate::util::binary_dir()?.join(LIBRARY_NAME))
}

type InitFn = unsafe extern "system" fn() -> *mut c_void;
type SetCallbacksFn = unsafe extern "system" fn(*mut c_void, *mut *mut c_void);
type ExecuteFn = unsafe extern "system" fn(*mut c_void, *const c_char) -> c_int;
type LocaleFn = unsafe extern "system" fn(*mut c_void) -> *const c_char;
type GetArrayFn = unsafe extern "system" fn(*mut c_void, EngineInt, *const c_char) -> EngineArray;
type SetArrayFn = unsafe extern "system" fn(
    *mut c_void,
    EngineInt,
    *const c_char,
    EngineInt,
    *const c_char,
) -> EngineInt;
type NounFn = unsafe extern "system" fn(
    *mut c_void,
    *const c_char,
    *mut EngineInt,
    *mut EngineInt,
    *mut EngineInt,
    *mut EngineInt,
) -> c_int;
type AllocateFn = unsafe extern "system" fn(
    *mut c_void,
    EngineInt,
    EngineInt,
    EngineInt,
    *const EngineInt,
) -> EngineArray;
type ErrorTextFn = unsafe extern "system" fn(*mut c_void, EngineInt, *mut EngineInt) -> c_int;
type TransposeFn = unsafe extern "system" fn(*mut c_void, EngineInt) -> c_int;
type InstanceFn = unsafe extern "system" fn(*mut c_void) -> c_int;

/// Entry points resolved from the library.
struct Symbols {
    init: InitFn,
    set_callbacks: SetCallbacksFn,
    execute: ExecuteFn,
    locale: LocaleFn,
    get_array: GetArrayFn,
    get_noun: NounFn,
    set_array: SetArrayFn,
    set_noun: NounFn,
    allocate: AllocateFn,
    error_text: ErrorTextFn,
    free: InstanceFn,
    transpose: TransposeFn,
    interrupt: InstanceFn,
    clear: InstanceFn,
    is_busy: InstanceFn,
}

impl Symbols {
    fn resolve(library: &Library) -> Result<Self, EngineError> {
        Ok(Self {
            init: symbol(library, "JInit")?,
            set_callbacks: symbol(library, "JSM")?,
            execute: symbol(library, "JDo")?,
            locale: symbol(library, "JGetLocale")?,
            get_array: symbol(library, "JGetA")?,
            get_noun: symbol(library, "JGetM")?,
            set_array: symbol(library, "JSetA")?,
            set_noun: symbol(library, "JSetM")?,
            allocate: symbol(library, "Jga")?,
            error_text: symbol(library, "JErrorTextM")?,
            free: symbol(library, "JFree")?,
            transpose: symbol(library, "JTranspose")?,
            interrupt: symbol(library, "JBreak")?,
            clear: symbol(library, "JClear")?,
            is_busy: symbol(library, "JIsBusy")?,
        })
    }
}

fn symbol<T: Copy>(
    library: &Library,
    name: &'static str,
) -> Result<T, EngineError> {
    // SAFETY: every `T` used above is the declared signature of `name` in the
    // engine ABI, and the copied pointer never outlives `DynamicEngine`,
    // which keeps the library loaded.
    let resolved = unsafe { library.get::<T>(name.as_bytes()) }
        .map_err(|source| EngineError::MissingSymbol { name, source })?;
    debug!("resolved engine symbol {}", name);
    Ok(*resolved)
}

/// Engine backed by a dynamically loaded library.
///
/// Loading resolves every entry point up front, so a missing symbol is a
/// startup failure rather than a surprise in the middle of a session.
pub struct DynamicEngine {
    path: PathBuf,
    symbols: Symbols,
    _library: Library,
}

impl std::fmt::Debug for DynamicEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DynamicEngine")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DynamicEngine {
    /// Load the engine library at `path` and resolve its entry points.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        info!("loading engine library {}", path.display());
        // SAFETY: loading runs the library's initialisers; the engine library
        // is trusted code chosen by the operator.
        let library = unsafe { Library::new(&path) }.map_err(|source| {
            EngineError::LibraryLoad {
                path: path.clone(),
                source,
            }
        })?;
        let symbols = Symbols::resolve(&library)?;
        Ok(Self {
            path,
            symbols,
            _library: library,
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// SAFETY (all blocks below): the function pointers come from the loaded
// library and match the engine ABI; handles are live instances of this
// engine, as required by the `Engine` contract.
impl Engine for DynamicEngine {
    fn create(&self) -> Option<EngineHandle> {
        EngineHandle::from_raw(unsafe { (self.symbols.init)() })
    }

    fn set_callbacks(
        &self,
        handle: EngineHandle,
        callbacks: &Callbacks,
    ) {
        let table = callbacks as *const Callbacks as *mut *mut c_void;
        unsafe { (self.symbols.set_callbacks)(handle.as_ptr(), table) }
    }

    fn execute(
        &self,
        handle: EngineHandle,
        sentence: &CStr,
    ) -> c_int {
        unsafe { (self.symbols.execute)(handle.as_ptr(), sentence.as_ptr()) }
    }

    fn locale(&self, handle: EngineHandle) -> Option<String> {
        let name = unsafe { (self.symbols.locale)(handle.as_ptr()) };
        if name.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr(name) };
        Some(name.to_string_lossy().into_owned())
    }

    fn get_array(
        &self,
        handle: EngineHandle,
        name: &CStr,
    ) -> EngineArray {
        let len = name.to_bytes().len() as EngineInt;
        unsafe { (self.symbols.get_array)(handle.as_ptr(), len, name.as_ptr()) }
    }

    fn set_array(
        &self,
        handle: EngineHandle,
        name: &CStr,
        data: &[u8],
    ) -> EngineInt {
        let len = name.to_bytes().len() as EngineInt;
        unsafe {
            (self.symbols.set_array)(
                handle.as_ptr(),
                len,
                name.as_ptr(),
                data.len() as EngineInt,
                data.as_ptr().cast(),
            )
        }
    }

    fn get_noun(
        &self,
        handle: EngineHandle,
        name: &CStr,
        noun: &mut NounDescriptor,
    ) -> c_int {
        unsafe {
            (self.symbols.get_noun)(
                handle.as_ptr(),
                name.as_ptr(),
                &mut noun.jtype,
                &mut noun.rank,
                &mut noun.shape,
                &mut noun.data,
            )
        }
    }

    fn set_noun(
        &self,
        handle: EngineHandle,
        name: &CStr,
        noun: &mut NounDescriptor,
    ) -> c_int {
        unsafe {
            (self.symbols.set_noun)(
                handle.as_ptr(),
                name.as_ptr(),
                &mut noun.jtype,
                &mut noun.rank,
                &mut noun.shape,
                &mut noun.data,
            )
        }
    }

    fn allocate_array(
        &self,
        handle: EngineHandle,
        jtype: EngineInt,
        count: EngineInt,
        shape: &[EngineInt],
    ) -> EngineArray {
        unsafe {
            (self.symbols.allocate)(
                handle.as_ptr(),
                jtype,
                count,
                shape.len() as EngineInt,
                shape.as_ptr(),
            )
        }
    }

    fn error_text(
        &self,
        handle: EngineHandle,
        code: EngineInt,
        text: &mut EngineInt,
    ) -> c_int {
        unsafe { (self.symbols.error_text)(handle.as_ptr(), code, text) }
    }

    fn transpose(
        &self,
        handle: EngineHandle,
        flag: EngineInt,
    ) -> c_int {
        unsafe { (self.symbols.transpose)(handle.as_ptr(), flag) }
    }

    fn interrupt(&self, handle: EngineHandle) -> c_int {
        unsafe { (self.symbols.interrupt)(handle.as_ptr()) }
    }

    fn clear(&self, handle: EngineHandle) -> c_int {
        unsafe { (self.symbols.clear)(handle.as_ptr()) }
    }

    fn is_busy(&self, handle: EngineHandle) -> c_int {
        unsafe { (self.symbols.is_busy)(handle.as_ptr()) }
    }

    fn free(&self, handle: EngineHandle) -> c_int {
        unsafe { (self.symbols.free)(handle.as_ptr()) }
    }
}
