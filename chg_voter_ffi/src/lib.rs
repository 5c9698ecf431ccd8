#![allow(clippy::missing_safety_doc)]

//! C ABI for charger drivers.
//!
//! Votables are created and found through an opaque registry handle. Every
//! `ChgVotable*` handed out (by create or find) owns a reference and must be
//! given back with `chg_votable_release`. Functions return `0` or a negative
//! errno; hook return codes are passed through.

use std::ffi::c_void;
use std::ptr;

use chg_voter_core::{result_or_einval, Decision, ElectionKind, HookError, VotableHandle, VotableState, VoteError, VoteRequest};
use chg_voter_registry::{DebugError, DebugFs, RegistryCfg, VotableRegistry};

/// Bump this when any `#[repr(C)]` layout or exported signature changes.
pub const CHG_VOTER_FFI_VERSION: u32 = 1;

const EINVAL: i32 = 22;
const ENOENT: i32 = 2;
const EACCES: i32 = 13;

#[no_mangle]
pub extern "C" fn chg_voter_ffi_version() -> u32 {
    CHG_VOTER_FFI_VERSION
}

/// FFI string view (UTF-8 bytes, not NUL terminated).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ChgStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl ChgStr {
    fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes).ok()
    }

    fn borrowed(s: &str) -> Self {
        Self {
            ptr: s.as_ptr(),
            len: s.len(),
        }
    }

    fn null() -> Self {
        Self {
            ptr: ptr::null(),
            len: 0,
        }
    }
}

/// Owned byte buffer, freed with `chg_bytes_free`.
#[repr(C)]
pub struct ChgBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

/// Applies the decision to hardware.
///
/// `effective_result` is `-EINVAL` and `has_result` is 0 when a MIN/MAX
/// votable has no enabled voter; `effective_client` is then a null view.
pub type ChgVoteCallback = extern "C" fn(
    votable: ChgStr,
    user_data: *mut c_void,
    effective_result: i64,
    has_result: u8,
    effective_client: ChgStr,
    step: u8,
) -> i32;

/// Vetoes a vote by returning a negative code.
pub type ChgVoteCheck = extern "C" fn(
    votable: ChgStr,
    user_data: *mut c_void,
    client: ChgStr,
    enabled: u8,
    value: i64,
    step: u8,
) -> i32;

#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// The C side owns `user_data` and promises it may be used from any thread.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

/// Opaque registry handle.
pub struct ChgVoterRegistry {
    inner: VotableRegistry,
}

/// Opaque votable reference.
pub struct ChgVotable {
    inner: VotableHandle,
}

fn hook_result(rc: i32, what: &str) -> Result<(), HookError> {
    if rc < 0 {
        Err(HookError::new(rc, what))
    } else {
        Ok(())
    }
}

fn err_to_rc(e: &VoteError) -> i32 {
    tracing::debug!(error = %e, "votable call failed");
    e.errno()
}

fn debug_err_to_rc(e: &DebugError) -> i32 {
    match e {
        DebugError::NotFound(_) => -ENOENT,
        DebugError::ReadOnly(_) => -EACCES,
        DebugError::Parse { .. } => -EINVAL,
        DebugError::Vote(v) => v.errno(),
    }
}

fn rc_of(r: Result<(), VoteError>) -> i32 {
    match r {
        Ok(()) => 0,
        Err(e) => err_to_rc(&e),
    }
}

fn into_handle(inner: VotableHandle) -> *mut ChgVotable {
    Box::into_raw(Box::new(ChgVotable { inner }))
}

#[no_mangle]
pub extern "C" fn chg_voter_registry_new(shards: usize) -> *mut ChgVoterRegistry {
    let cfg = RegistryCfg {
        shards: shards.max(1),
        ..RegistryCfg::default()
    };
    Box::into_raw(Box::new(ChgVoterRegistry {
        inner: VotableRegistry::new(cfg),
    }))
}

/// Frees the registry. Outstanding `ChgVotable` references stay valid.
#[no_mangle]
pub unsafe extern "C" fn chg_voter_registry_free(reg: *mut ChgVoterRegistry) {
    if !reg.is_null() {
        let reg = Box::from_raw(reg);
        reg.inner.shutdown();
    }
}

/// Create a votable. `kind`: 0 = MIN, 1 = MAX, 2 = SET_ANY.
#[no_mangle]
pub unsafe extern "C" fn chg_votable_create(
    reg: *mut ChgVoterRegistry,
    name: ChgStr,
    kind: i32,
    callback: Option<ChgVoteCallback>,
    user_data: *mut c_void,
    out: *mut *mut ChgVotable,
) -> i32 {
    if reg.is_null() || out.is_null() {
        return -EINVAL;
    }
    let (Some(name), Some(callback)) = (name.as_str(), callback) else {
        return -EINVAL;
    };
    let kind = match ElectionKind::try_from(kind) {
        Ok(k) => k,
        Err(e) => return err_to_rc(&e),
    };

    let data = UserData(user_data);
    let cb = move |state: &VotableState, d: Decision<'_>| {
        // Capture the Send wrapper, not its raw pointer field.
        let data = data;
        let rc = callback(
            ChgStr::borrowed(state.name()),
            data.0,
            result_or_einval(d.value),
            d.value.is_some() as u8,
            d.client.map(ChgStr::borrowed).unwrap_or_else(ChgStr::null),
            d.step as u8,
        );
        hook_result(rc, "votable callback failed")
    };

    match (*reg).inner.create(name, kind, cb) {
        Ok(v) => {
            *out = into_handle(v);
            0
        }
        Err(e) => err_to_rc(&e),
    }
}

/// Look up a votable by name; null if absent.
#[no_mangle]
pub unsafe extern "C" fn chg_votable_find(reg: *mut ChgVoterRegistry, name: ChgStr) -> *mut ChgVotable {
    if reg.is_null() {
        return ptr::null_mut();
    }
    let Some(name) = name.as_str() else {
        return ptr::null_mut();
    };
    match (*reg).inner.find(name) {
        Some(v) => into_handle(v),
        None => ptr::null_mut(),
    }
}

/// Unregister a votable. References already handed out stay valid until released.
#[no_mangle]
pub unsafe extern "C" fn chg_votable_destroy(reg: *mut ChgVoterRegistry, name: ChgStr) -> i32 {
    if reg.is_null() {
        return -EINVAL;
    }
    let Some(name) = name.as_str() else {
        return -EINVAL;
    };
    rc_of((*reg).inner.destroy(name).map(|_| ()))
}

#[no_mangle]
pub unsafe extern "C" fn chg_votable_release(h: *mut ChgVotable) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

#[no_mangle]
pub unsafe extern "C" fn chg_vote(h: *mut ChgVotable, client: ChgStr, enabled: u8, value: i64, step: u8) -> i32 {
    if h.is_null() {
        return -EINVAL;
    }
    let Some(client) = client.as_str() else {
        return -EINVAL;
    };
    rc_of((*h).inner.vote(client, enabled != 0, value, step != 0))
}

#[no_mangle]
pub unsafe extern "C" fn chg_vote_override(h: *mut ChgVotable, client: ChgStr, enabled: u8, value: i64, step: u8) -> i32 {
    if h.is_null() {
        return -EINVAL;
    }
    let Some(client) = client.as_str() else {
        return -EINVAL;
    };
    rc_of((*h).inner.vote_override(client, enabled != 0, value, step != 0))
}

#[no_mangle]
pub unsafe extern "C" fn chg_rerun_election(h: *mut ChgVotable, step: u8) -> i32 {
    if h.is_null() {
        return -EINVAL;
    }
    rc_of((*h).inner.rerun_election(step != 0))
}

#[no_mangle]
pub unsafe extern "C" fn chg_votable_add_map(h: *mut ChgVotable, original: i64, mapped: i64) -> i32 {
    if h.is_null() {
        return -EINVAL;
    }
    rc_of((*h).inner.add_map(original, mapped))
}

#[no_mangle]
pub unsafe extern "C" fn chg_votable_add_check(h: *mut ChgVotable, check: Option<ChgVoteCheck>, user_data: *mut c_void) -> i32 {
    if h.is_null() {
        return -EINVAL;
    }
    let Some(check) = check else {
        return -EINVAL;
    };

    let data = UserData(user_data);
    let f = move |req: &VoteRequest<'_>| {
        let data = data;
        let rc = check(
            ChgStr::borrowed(req.state.name()),
            data.0,
            ChgStr::borrowed(req.client),
            req.enabled as u8,
            req.value,
            req.step as u8,
        );
        hook_result(rc, "vote check rejected")
    };
    rc_of((*h).inner.add_check(f))
}

/// Writes the effective result to `out`, `-EINVAL` when a MIN/MAX votable
/// has no enabled client.
#[no_mangle]
pub unsafe extern "C" fn chg_get_effective_result(h: *mut ChgVotable, out: *mut i64) -> i32 {
    if h.is_null() || out.is_null() {
        return -EINVAL;
    }
    match (*h).inner.effective_result() {
        Ok(v) => {
            *out = result_or_einval(v);
            0
        }
        Err(e) => err_to_rc(&e),
    }
}

/// Like `chg_get_effective_result`, with `client`'s vote left out.
#[no_mangle]
pub unsafe extern "C" fn chg_get_effective_result_exclude_client(h: *mut ChgVotable, client: ChgStr, out: *mut i64) -> i32 {
    if h.is_null() || out.is_null() {
        return -EINVAL;
    }
    let Some(client) = client.as_str() else {
        return -EINVAL;
    };
    match (*h).inner.effective_result_exclude_client(client) {
        Ok(v) => {
            *out = result_or_einval(v);
            0
        }
        Err(e) => err_to_rc(&e),
    }
}

/// Copies the effective client name into `buf` (truncated to `cap`) and
/// returns its full length, `0` if there is none.
#[no_mangle]
pub unsafe extern "C" fn chg_get_effective_client(h: *mut ChgVotable, buf: *mut u8, cap: usize) -> isize {
    if h.is_null() || (buf.is_null() && cap > 0) {
        return -EINVAL as isize;
    }
    match (*h).inner.effective_client() {
        Ok(Some(name)) => {
            let n = name.len().min(cap);
            if n > 0 {
                ptr::copy_nonoverlapping(name.as_ptr(), buf, n);
            }
            name.len() as isize
        }
        Ok(None) => 0,
        Err(e) => err_to_rc(&e) as isize,
    }
}

/// Writes `client`'s vote to `out`; `-EINVAL` if a MIN/MAX client is not enabled.
#[no_mangle]
pub unsafe extern "C" fn chg_get_client_vote(h: *mut ChgVotable, client: ChgStr, out: *mut i64) -> i32 {
    if h.is_null() || out.is_null() {
        return -EINVAL;
    }
    let Some(client) = client.as_str() else {
        return -EINVAL;
    };
    match (*h).inner.get_client_vote(client) {
        Ok(Some(v)) => {
            *out = v;
            0
        }
        Ok(None) => -EINVAL,
        Err(e) => err_to_rc(&e),
    }
}

/// 1 if enabled, 0 if not, negative errno on failure.
#[no_mangle]
pub unsafe extern "C" fn chg_is_client_vote_enabled(h: *mut ChgVotable, client: ChgStr) -> i32 {
    if h.is_null() {
        return -EINVAL;
    }
    let Some(client) = client.as_str() else {
        return -EINVAL;
    };
    match (*h).inner.is_client_vote_enabled(client) {
        Ok(b) => b as i32,
        Err(e) => err_to_rc(&e),
    }
}

#[no_mangle]
pub unsafe extern "C" fn chg_is_override_vote_enabled(h: *mut ChgVotable) -> i32 {
    if h.is_null() {
        return -EINVAL;
    }
    match (*h).inner.is_override_vote_enabled() {
        Ok(b) => b as i32,
        Err(e) => err_to_rc(&e),
    }
}

/// Read a debug entry (`"<votable>/status"`, `"/force_val"`, `"/force_active"`).
/// On failure `rc` receives a negative errno and an empty buffer is returned.
#[no_mangle]
pub unsafe extern "C" fn chg_debug_read(reg: *mut ChgVoterRegistry, path: ChgStr, rc: *mut i32) -> ChgBytes {
    let empty = ChgBytes {
        ptr: ptr::null_mut(),
        len: 0,
    };
    let set_rc = |v: i32| {
        if !rc.is_null() {
            *rc = v;
        }
    };
    if reg.is_null() {
        set_rc(-EINVAL);
        return empty;
    }
    let Some(path) = path.as_str() else {
        set_rc(-EINVAL);
        return empty;
    };

    match DebugFs::new(&(*reg).inner).read(path) {
        Ok(text) => {
            set_rc(0);
            let mut boxed = text.into_bytes().into_boxed_slice();
            let ptr = boxed.as_mut_ptr();
            let len = boxed.len();
            std::mem::forget(boxed);
            ChgBytes { ptr, len }
        }
        Err(e) => {
            set_rc(debug_err_to_rc(&e));
            empty
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn chg_debug_write(reg: *mut ChgVoterRegistry, path: ChgStr, input: ChgStr) -> i32 {
    if reg.is_null() {
        return -EINVAL;
    }
    let (Some(path), Some(input)) = (path.as_str(), input.as_str()) else {
        return -EINVAL;
    };
    match DebugFs::new(&(*reg).inner).write(path, input) {
        Ok(()) => 0,
        Err(e) => debug_err_to_rc(&e),
    }
}

#[no_mangle]
pub unsafe extern "C" fn chg_bytes_free(b: ChgBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = std::ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}
