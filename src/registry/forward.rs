//! Id-addressed forwarding to engine operations
//!
//! Each operation resolves the session id, reports an invalid id as
//! [`RegistryError::SessionNotFound`] and otherwise passes its arguments to
//! the engine unchanged, returning the engine's result unchanged.

use std::ffi::{c_int, CStr, CString};

use super::{Lease, Registry, RegistryError, Session, SessionId};
use crate::engine::{Callbacks, Engine, EngineArray, EngineError, EngineInt, NounDescriptor};
use crate::interrupt::CancelCounter;

impl<E: Engine> Session<E> {
    pub fn set_callbacks(&self, callbacks: &Callbacks) {
        self.engine.set_callbacks(self.handle, callbacks);
    }

    pub fn execute(&self, sentence: &CStr) -> c_int {
        self.engine.execute(self.handle, sentence)
    }

    pub fn locale(&self) -> Option<String> {
        self.engine.locale(self.handle)
    }

    pub fn get_array(&self, name: &CStr) -> EngineArray {
        self.engine.get_array(self.handle, name)
    }

    pub fn set_array(
        &self,
        name: &CStr,
        data: &[u8],
    ) -> EngineInt {
        self.engine.set_array(self.handle, name, data)
    }

    pub fn get_noun(
        &self,
        name: &CStr,
        noun: &mut NounDescriptor,
    ) -> c_int {
        self.engine.get_noun(self.handle, name, noun)
    }

    pub fn set_noun(
        &self,
        name: &CStr,
        noun: &mut NounDescriptor,
    ) -> c_int {
        self.engine.set_noun(self.handle, name, noun)
    }

    pub fn allocate_array(
        &self,
        jtype: EngineInt,
        count: EngineInt,
        shape: &[EngineInt],
    ) -> EngineArray {
        self.engine.allocate_array(self.handle, jtype, count, shape)
    }

    pub fn error_text(
        &self,
        code: EngineInt,
        text: &mut EngineInt,
    ) -> c_int {
        self.engine.error_text(self.handle, code, text)
    }

    pub fn transpose(&self, flag: EngineInt) -> c_int {
        self.engine.transpose(self.handle, flag)
    }

    pub fn interrupt(&self) -> c_int {
        self.engine.interrupt(self.handle)
    }

    pub fn clear(&self) -> c_int {
        self.engine.clear(self.handle)
    }

    pub fn is_busy(&self) -> c_int {
        self.engine.is_busy(self.handle)
    }
}

impl<E: Engine> Registry<E> {
    pub fn set_callbacks(
        &self,
        id: i64,
        callbacks: &Callbacks,
    ) -> Result<SessionId, RegistryError> {
        let session = self.lookup_raw(id)?;
        session.set_callbacks(callbacks);
        Ok(session.id())
    }

    pub fn execute(
        &self,
        id: i64,
        sentence: &str,
    ) -> Result<c_int, EngineError> {
        let session = self.lookup_raw(id)?;
        let sentence = CString::new(sentence)?;
        Ok(session.execute(&sentence))
    }

    pub fn locale(&self, id: i64) -> Result<Option<String>, RegistryError> {
        Ok(self.lookup_raw(id)?.locale())
    }

    pub fn get_array(
        &self,
        id: i64,
        name: &str,
    ) -> Result<EngineArray, EngineError> {
        let session = self.lookup_raw(id)?;
        let name = CString::new(name)?;
        Ok(session.get_array(&name))
    }

    pub fn set_array(
        &self,
        id: i64,
        name: &str,
        data: &[u8],
    ) -> Result<EngineInt, EngineError> {
        let session = self.lookup_raw(id)?;
        let name = CString::new(name)?;
        Ok(session.set_array(&name, data))
    }

    pub fn get_noun(
        &self,
        id: i64,
        name: &str,
        noun: &mut NounDescriptor,
    ) -> Result<c_int, EngineError> {
        let session = self.lookup_raw(id)?;
        let name = CString::new(name)?;
        Ok(session.get_noun(&name, noun))
    }

    pub fn set_noun(
        &self,
        id: i64,
        name: &str,
        noun: &mut NounDescriptor,
    ) -> Result<c_int, EngineError> {
        let session = self.lookup_raw(id)?;
        let name = CString::new(name)?;
        Ok(session.set_noun(&name, noun))
    }

    pub fn allocate_array(
        &self,
        id: i64,
        jtype: EngineInt,
        count: EngineInt,
        shape: &[EngineInt],
    ) -> Result<EngineArray, RegistryError> {
        Ok(self.lookup_raw(id)?.allocate_array(jtype, count, shape))
    }

    pub fn error_text(
        &self,
        id: i64,
        code: EngineInt,
        text: &mut EngineInt,
    ) -> Result<c_int, RegistryError> {
        Ok(self.lookup_raw(id)?.error_text(code, text))
    }

    pub fn transpose(
        &self,
        id: i64,
        flag: EngineInt,
    ) -> Result<c_int, RegistryError> {
        Ok(self.lookup_raw(id)?.transpose(flag))
    }

    pub fn interrupt(&self, id: i64) -> Result<c_int, RegistryError> {
        Ok(self.lookup_raw(id)?.interrupt())
    }

    pub fn clear(&self, id: i64) -> Result<c_int, RegistryError> {
        Ok(self.lookup_raw(id)?.clear())
    }

    pub fn is_busy(&self, id: i64) -> Result<c_int, RegistryError> {
        Ok(self.lookup_raw(id)?.is_busy())
    }

    /// Release the session (the engine's `JFree` under an id).
    pub fn free(&self, id: i64) -> Result<(), RegistryError> {
        self.release(SessionId::try_from(id)?)
    }

    /// Bump the session's break cell once. `None` when the instance exposes
    /// no break cell.
    pub fn increment_break(&self, id: i64) -> Result<Option<u8>, RegistryError> {
        let session: Lease<E> = self.lookup_raw(id)?;
        Ok(CancelCounter::resolve(&session).map(|counter| counter.request_cancel()))
    }
}
