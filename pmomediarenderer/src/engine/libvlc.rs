//! Minimal libvlc binding, loaded at runtime with `libloading`.
//!
//! Only the media player calls the native engine needs are resolved, plus the
//! event manager used to receive position, length and stop notifications.
//! Signatures follow the libvlc 3.x headers.

use std::{
    ffi::{c_char, c_int, c_void, CString},
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    ptr,
    sync::Arc,
};

use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    engine::native::{NativeBinding, PlaybackEvents},
    errors::PlayerError,
};

const EVENT_MEDIA_PLAYER_STOPPED: c_int = 0x106;
const EVENT_MEDIA_PLAYER_END_REACHED: c_int = 0x109;
const EVENT_MEDIA_PLAYER_POSITION_CHANGED: c_int = 0x10C;
const EVENT_MEDIA_PLAYER_LENGTH_CHANGED: c_int = 0x111;

const SUBSCRIBED_EVENTS: [c_int; 4] = [
    EVENT_MEDIA_PLAYER_POSITION_CHANGED,
    EVENT_MEDIA_PLAYER_LENGTH_CHANGED,
    EVENT_MEDIA_PLAYER_STOPPED,
    EVENT_MEDIA_PLAYER_END_REACHED,
];

#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["libvlc.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["libvlc.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &["libvlc.so.5", "libvlc.so"];

/// `libvlc_event_t`: type, emitter, then a union of per-event payloads.
#[repr(C)]
struct LibvlcEvent {
    kind: c_int,
    _obj: *mut c_void,
    payload: EventPayload,
}

#[repr(C)]
union EventPayload {
    new_position: f32,
    new_length: i64,
    _reserved: [u64; 4],
}

type EventCallback = unsafe extern "C" fn(*const LibvlcEvent, *mut c_void);

type NewFn = unsafe extern "C" fn(c_int, *const *const c_char) -> *mut c_void;
type ReleaseFn = unsafe extern "C" fn(*mut c_void);
type PlayerNewFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type MediaNewLocationFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_void;
type SetMediaFn = unsafe extern "C" fn(*mut c_void, *mut c_void);
type PlayFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type StopFn = unsafe extern "C" fn(*mut c_void);
type SetPauseFn = unsafe extern "C" fn(*mut c_void, c_int);
type GetTimeFn = unsafe extern "C" fn(*mut c_void) -> i64;
type SetTimeFn = unsafe extern "C" fn(*mut c_void, i64);
type EventManagerFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type EventAttachFn = unsafe extern "C" fn(*mut c_void, c_int, EventCallback, *mut c_void) -> c_int;
type EventDetachFn = unsafe extern "C" fn(*mut c_void, c_int, EventCallback, *mut c_void);

struct VlcApi {
    new: NewFn,
    release: ReleaseFn,
    player_new: PlayerNewFn,
    player_release: ReleaseFn,
    media_new_location: MediaNewLocationFn,
    media_release: ReleaseFn,
    set_media: SetMediaFn,
    play: PlayFn,
    stop: StopFn,
    set_pause: SetPauseFn,
    get_time: GetTimeFn,
    set_time: SetTimeFn,
    event_manager: EventManagerFn,
    event_attach: EventAttachFn,
    event_detach: EventDetachFn,
}

struct Handles {
    instance: *mut c_void,
    player: *mut c_void,
    event_manager: *mut c_void,
    listener: *mut Arc<dyn PlaybackEvents>,
}

pub struct LibVlc {
    location: String,
    api: VlcApi,
    handles: Mutex<Option<Handles>>,
    // Dropped last: the function pointers above point into it.
    _lib: Library,
}

// SAFETY: the raw handles are only used through libvlc calls, which are
// thread-safe for a single media player, and every access goes through the
// `handles` mutex.
unsafe impl Send for LibVlc {}
unsafe impl Sync for LibVlc {}

/// Resolves `name` and copies the function pointer out of the library.
///
/// # Safety
/// `T` must be the exact function pointer type of the exported symbol.
unsafe fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T, PlayerError> {
    let mut c_name = name.as_bytes().to_vec();
    c_name.push(0);
    lib.get::<T>(&c_name)
        .map(|s| *s)
        .map_err(|e| PlayerError::Symbol(format!("{name}: {e}")))
}

impl LibVlc {
    /// Opens libvlc from the first directory of `search_path` holding it,
    /// falling back to the system loader.
    pub fn open(search_path: &[PathBuf]) -> Result<Self, PlayerError> {
        let mut attempts = Vec::new();

        for dir in search_path {
            for name in LIBRARY_NAMES {
                let candidate = dir.join(name);
                if !candidate.exists() {
                    continue;
                }
                match Self::open_file(&candidate) {
                    Ok(vlc) => return Ok(vlc),
                    Err(err) => attempts.push(format!("{}: {}", candidate.display(), err)),
                }
            }
        }

        for name in LIBRARY_NAMES {
            match Self::open_file(Path::new(name)) {
                Ok(vlc) => return Ok(vlc),
                Err(err) => attempts.push(format!("{name}: {err}")),
            }
        }

        Err(PlayerError::LibraryLoad(attempts.join("; ")))
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn open_file(path: &Path) -> Result<Self, PlayerError> {
        debug!(path = %path.display(), "Trying libvlc");

        // SAFETY: loading libvlc runs its library constructors, which only
        // register plugins and do not touch our state.
        let lib = unsafe { Library::new(path) }
            .map_err(|e| PlayerError::LibraryLoad(format!("{}: {e}", path.display())))?;

        // SAFETY: every type below matches the libvlc 3.x prototype of the
        // symbol it is resolved with.
        let api = unsafe {
            VlcApi {
                new: symbol(&lib, "libvlc_new")?,
                release: symbol(&lib, "libvlc_release")?,
                player_new: symbol(&lib, "libvlc_media_player_new")?,
                player_release: symbol(&lib, "libvlc_media_player_release")?,
                media_new_location: symbol(&lib, "libvlc_media_new_location")?,
                media_release: symbol(&lib, "libvlc_media_release")?,
                set_media: symbol(&lib, "libvlc_media_player_set_media")?,
                play: symbol(&lib, "libvlc_media_player_play")?,
                stop: symbol(&lib, "libvlc_media_player_stop")?,
                set_pause: symbol(&lib, "libvlc_media_player_set_pause")?,
                get_time: symbol(&lib, "libvlc_media_player_get_time")?,
                set_time: symbol(&lib, "libvlc_media_player_set_time")?,
                event_manager: symbol(&lib, "libvlc_media_player_event_manager")?,
                event_attach: symbol(&lib, "libvlc_event_attach")?,
                event_detach: symbol(&lib, "libvlc_event_detach")?,
            }
        };

        // SAFETY: argc = 0 with a null argv is the documented default call.
        let instance = unsafe { (api.new)(0, ptr::null()) };
        if instance.is_null() {
            return Err(PlayerError::Native("libvlc_new failed".into()));
        }

        // SAFETY: `instance` is a live libvlc instance.
        let player = unsafe { (api.player_new)(instance) };
        if player.is_null() {
            // SAFETY: releasing the instance we just created.
            unsafe { (api.release)(instance) };
            return Err(PlayerError::Native("libvlc_media_player_new failed".into()));
        }

        // SAFETY: `player` is a live media player; the manager lives as long as it.
        let event_manager = unsafe { (api.event_manager)(player) };

        info!(path = %path.display(), "libvlc opened");
        Ok(Self {
            location: path.display().to_string(),
            api,
            handles: Mutex::new(Some(Handles {
                instance,
                player,
                event_manager,
                listener: ptr::null_mut(),
            })),
            _lib: lib,
        })
    }

    fn with_player<T>(&self, f: impl FnOnce(&Handles) -> T) -> Result<T, PlayerError> {
        let handles = self.handles.lock();
        let handles = handles
            .as_ref()
            .ok_or_else(|| PlayerError::Native("libvlc has been released".into()))?;
        Ok(f(handles))
    }

    fn detach_listener(&self, handles: &mut Handles) {
        if handles.listener.is_null() {
            return;
        }
        for kind in SUBSCRIBED_EVENTS {
            // SAFETY: same manager, callback and user data as in `attach`.
            unsafe {
                (self.api.event_detach)(
                    handles.event_manager,
                    kind,
                    vlc_event_trampoline,
                    handles.listener.cast(),
                )
            };
        }
        // SAFETY: created by `Box::into_raw` in `attach` and no longer
        // reachable from libvlc after the detach calls above.
        drop(unsafe { Box::from_raw(handles.listener) });
        handles.listener = ptr::null_mut();
    }
}

unsafe extern "C" fn vlc_event_trampoline(event: *const LibvlcEvent, data: *mut c_void) {
    if event.is_null() || data.is_null() {
        return;
    }
    // Panics must not cross the FFI boundary.
    let _ = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: libvlc hands back the user data registered in `attach`,
        // which stays alive until detached.
        let listener = unsafe { &*(data as *const Arc<dyn PlaybackEvents>) };
        // SAFETY: `event` is valid for the duration of the callback and the
        // union member read matches the event type.
        unsafe {
            match (*event).kind {
                EVENT_MEDIA_PLAYER_POSITION_CHANGED => {
                    listener.on_position_changed((*event).payload.new_position)
                }
                EVENT_MEDIA_PLAYER_LENGTH_CHANGED => {
                    listener.on_duration_changed((*event).payload.new_length)
                }
                EVENT_MEDIA_PLAYER_STOPPED | EVENT_MEDIA_PLAYER_END_REACHED => {
                    listener.on_stopped()
                }
                _ => {}
            }
        }
    }));
}

impl NativeBinding for LibVlc {
    fn attach(&self, events: Arc<dyn PlaybackEvents>) -> Result<(), PlayerError> {
        let mut guard = self.handles.lock();
        let handles = guard
            .as_mut()
            .ok_or_else(|| PlayerError::Native("libvlc has been released".into()))?;

        self.detach_listener(handles);
        let listener = Box::into_raw(Box::new(events));
        handles.listener = listener;

        for kind in SUBSCRIBED_EVENTS {
            // SAFETY: `listener` outlives the registration (freed in
            // `detach_listener`), and the callback matches `libvlc_callback_t`.
            let rc = unsafe {
                (self.api.event_attach)(
                    handles.event_manager,
                    kind,
                    vlc_event_trampoline,
                    listener.cast(),
                )
            };
            if rc != 0 {
                warn!(event = kind, "libvlc refused an event subscription");
            }
        }
        Ok(())
    }

    fn play_media(&self, uri: &str) -> Result<(), PlayerError> {
        let location = CString::new(uri)
            .map_err(|_| PlayerError::Native(format!("URI contains a NUL byte: {uri}")))?;

        let rc = self.with_player(|h| {
            // SAFETY: live instance and player; `location` outlives the call and
            // libvlc copies it. The player keeps its own media reference.
            unsafe {
                let media = (self.api.media_new_location)(h.instance, location.as_ptr());
                if media.is_null() {
                    return -1;
                }
                (self.api.set_media)(h.player, media);
                (self.api.media_release)(media);
                (self.api.play)(h.player)
            }
        })?;

        if rc != 0 {
            return Err(PlayerError::Native(format!("libvlc cannot play {uri}")));
        }
        Ok(())
    }

    fn set_pause(&self, paused: bool) -> Result<(), PlayerError> {
        // SAFETY: live media player.
        self.with_player(|h| unsafe { (self.api.set_pause)(h.player, c_int::from(paused)) })
    }

    fn stop(&self) -> Result<(), PlayerError> {
        // SAFETY: live media player.
        self.with_player(|h| unsafe { (self.api.stop)(h.player) })
    }

    fn skip(&self, offset_millis: i64) -> Result<(), PlayerError> {
        self.with_player(|h| {
            // SAFETY: live media player.
            unsafe {
                let now = (self.api.get_time)(h.player);
                let target = now.saturating_add(offset_millis).max(0);
                (self.api.set_time)(h.player, target);
            }
        })
    }

    fn release(&self) {
        let Some(mut handles) = self.handles.lock().take() else {
            return;
        };
        self.detach_listener(&mut handles);
        // SAFETY: handles created in `open_file`, released exactly once
        // because they were taken out of the mutex.
        unsafe {
            (self.api.stop)(handles.player);
            (self.api.player_release)(handles.player);
            (self.api.release)(handles.instance);
        }
        debug!(library = %self.location, "libvlc released");
    }
}

impl Drop for LibVlc {
    fn drop(&mut self) {
        self.release();
    }
}
