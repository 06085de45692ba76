use crate::core::error::{BridgeError, BridgeResult};
use crate::core::function::Function;
use crate::core::reference::Ref;
use crate::core::stack::{Stack, StackGuard};
use crate::core::table::Table;
use crate::ffi;
use crate::types::enums::{ChunkMode, Status, StdLib};
use std::ffi::CString;
use std::fmt;
use std::os::raw::{c_int, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::rc::Rc;
use tracing::debug;

/// Settings applied when a [`Vm`] is created.
#[derive(Debug, Clone)]
pub struct VmOptions {
    pub libs: StdLib,
    pub mode: ChunkMode,
    pub chunk_name: String,
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions {
            libs: StdLib::ALL,
            mode: ChunkMode::Text,
            chunk_name: "buffer".to_string(),
        }
    }
}

impl VmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn libs(mut self, libs: StdLib) -> Self {
        self.libs = libs;
        self
    }

    pub fn mode(mut self, mode: ChunkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn chunk_name(mut self, name: impl Into<String>) -> Self {
        self.chunk_name = name.into();
        self
    }
}

/// Registry key whose light userdata points at the owning [`State`].
static OWNER_KEY: u8 = 0;

fn owner_key() -> *const c_void {
    ptr::addr_of!(OWNER_KEY).cast()
}

struct State {
    /// The main thread. Closing it closes every coroutine too.
    main: NonNull<ffi::lua_State>,
    owned: bool,
    options: VmOptions,
}

impl Drop for State {
    fn drop(&mut self) {
        if self.owned {
            debug!(state = ?self.main, "closing Lua state");
            let main = self.main.as_ptr();
            unsafe {
                // finalizers that call back into Rust must not find this owner
                ffi::lua_settop(main, 0);
                ffi::lua_pushnil(main);
                ffi::lua_rawsetp(main, ffi::LUA_REGISTRYINDEX, owner_key());
                ffi::lua_close(main);
            }
        }
    }
}

/// One embedded Lua execution context.
///
/// Cloning a `Vm` is cheap and shares the same state. An owning instance
/// closes its state when the last clone goes away; every handle keeps a
/// clone, so handles created from an owning instance cannot outlive it.
/// This includes handles created inside native functions and coroutines:
/// the instance passed to a native function shares ownership with the
/// instance that created the state.
///
/// A handle moved into a Rust closure that is then exposed to Lua keeps
/// the state open for as long as the closure lives, and the closure lives
/// until the state is closed. Pass such values as `captured` arguments
/// instead; those are stored as Lua upvalues.
///
/// `Vm` is neither `Send` nor `Sync`: a Lua state has exactly one thread of
/// control.
#[derive(Clone)]
pub struct Vm {
    state: Rc<State>,
    /// The thread this instance pushes to: the main thread or a coroutine.
    thread: NonNull<ffi::lua_State>,
}

impl Vm {
    /// Creates an owning instance with every standard library opened.
    pub fn new() -> BridgeResult<Self> {
        Self::with_options(VmOptions::default())
    }

    pub fn with_options(options: VmOptions) -> BridgeResult<Self> {
        let raw = NonNull::new(unsafe { ffi::luaL_newstate() })
            .ok_or(BridgeError::FailedToCreateState)?;

        if options.libs == StdLib::ALL {
            unsafe { ffi::luaL_openlibs(raw.as_ptr()) };
        } else {
            for (name, open) in options.libs.openers() {
                unsafe {
                    ffi::luaL_requiref(raw.as_ptr(), name.as_ptr(), open, 1);
                    ffi::lua_pop(raw.as_ptr(), 1);
                }
            }
        }

        debug!(state = ?raw, libs = ?options.libs, "created Lua state");

        let state = Rc::new(State {
            main: raw,
            owned: true,
            options,
        });
        unsafe {
            ffi::lua_pushlightuserdata(raw.as_ptr(), Rc::as_ptr(&state) as *mut c_void);
            ffi::lua_rawsetp(raw.as_ptr(), ffi::LUA_REGISTRYINDEX, owner_key());
        }
        Ok(Vm { state, thread: raw })
    }

    /// Wraps a state owned by someone else. The state is never closed by
    /// this instance.
    ///
    /// # Safety
    /// `raw` must be non-null and point to a live Lua state (or one of its
    /// coroutines) that outlives the returned instance and every handle
    /// created through it.
    pub unsafe fn from_raw(raw: *mut ffi::lua_State) -> Self {
        debug_assert!(!raw.is_null());
        let thread = unsafe { NonNull::new_unchecked(raw) };
        let main = unsafe { main_of(raw) }.unwrap_or(thread);
        Vm {
            state: Rc::new(State {
                main,
                owned: false,
                options: VmOptions::default(),
            }),
            thread,
        }
    }

    /// The instance handed to a native function running on `raw`.
    ///
    /// Shares ownership with the [`Vm`] that created the state when there
    /// is one, so handles made during the call keep the state open.
    ///
    /// # Safety
    /// `raw` must be the thread Lua passed to the running C function.
    pub(crate) unsafe fn from_callback(raw: *mut ffi::lua_State) -> Self {
        let owner = unsafe {
            ffi::lua_rawgetp(raw, ffi::LUA_REGISTRYINDEX, owner_key());
            let owner = ffi::lua_touserdata(raw, -1) as *const State;
            ffi::lua_pop(raw, 1);
            owner
        };
        if owner.is_null() {
            return unsafe { Self::from_raw(raw) };
        }
        // the key is cleared before the owner is freed
        let state = unsafe {
            Rc::increment_strong_count(owner);
            Rc::from_raw(owner)
        };
        Vm {
            state,
            thread: unsafe { NonNull::new_unchecked(raw) },
        }
    }

    pub fn as_raw(&self) -> *mut ffi::lua_State {
        self.thread.as_ptr()
    }

    pub fn is_owned(&self) -> bool {
        self.state.owned
    }

    pub fn options(&self) -> &VmOptions {
        &self.state.options
    }

    /// Number of values currently on the stack.
    pub fn stack_depth(&self) -> c_int {
        unsafe { ffi::lua_gettop(self.as_raw()) }
    }

    /// The instance driving the main thread of this state, sharing
    /// ownership with `self`.
    pub(crate) fn main_thread(&self) -> Vm {
        Vm {
            state: self.state.clone(),
            thread: self.state.main,
        }
    }

    /// Two instances are the same when they belong to the same Lua state,
    /// whichever of its threads they drive.
    pub fn same_state(&self, other: &Vm) -> bool {
        self.state.main == other.state.main
    }

    pub fn globals(&self) -> Table {
        let _guard = StackGuard::new(self, 0);
        Stack::ensure(self, 1);
        unsafe {
            ffi::lua_rawgeti(
                self.as_raw(),
                ffi::LUA_REGISTRYINDEX,
                ffi::LUA_RIDX_GLOBALS,
            )
        };
        Table::from_ref(Ref::from_top_unchecked(self))
    }

    pub fn create_table(&self) -> Table {
        Table::new(self)
    }

    /// Compiles `source` with the configured chunk name and mode.
    pub fn load_buffer(
        &self,
        source: impl AsRef<[u8]>,
        environment: Option<&Table>,
    ) -> BridgeResult<Function> {
        let options = self.options();
        self.load_buffer_named(
            source,
            &options.chunk_name.clone(),
            options.mode,
            environment,
        )
    }

    pub fn load_buffer_named(
        &self,
        source: impl AsRef<[u8]>,
        name: &str,
        mode: ChunkMode,
        environment: Option<&Table>,
    ) -> BridgeResult<Function> {
        let _guard = StackGuard::new(self, 0);
        Stack::reserve(self, 2)?;
        let source = source.as_ref();
        let c_name = CString::new(name)?;

        let status = unsafe {
            ffi::luaL_loadbufferx(
                self.as_raw(),
                source.as_ptr() as *const _,
                source.len(),
                c_name.as_ptr(),
                mode.as_cstr().as_ptr(),
            )
        };
        debug!(chunk = name, bytes = source.len(), ?mode, "loaded buffer");

        self.finish_load(status, environment)
    }

    pub fn load_file(
        &self,
        path: impl AsRef<Path>,
        environment: Option<&Table>,
    ) -> BridgeResult<Function> {
        let _guard = StackGuard::new(self, 0);
        Stack::reserve(self, 2)?;
        let path = path.as_ref();
        let c_path = CString::new(path.to_str().ok_or(BridgeError::InvalidPath)?)?;

        let status = unsafe {
            ffi::luaL_loadfilex(
                self.as_raw(),
                c_path.as_ptr(),
                self.options().mode.as_cstr().as_ptr(),
            )
        };
        debug!(path = %path.display(), "loaded file");

        self.finish_load(status, environment)
    }

    fn finish_load(&self, status: c_int, environment: Option<&Table>) -> BridgeResult<Function> {
        let status = Status::from_raw(status);
        if status != Status::Ok {
            let message = Stack::pop_error_message(self);
            return Err(BridgeError::from_load_status(status, message));
        }

        if let Some(environment) = environment {
            Stack::push(self, environment)?;
            let name = unsafe { ffi::lua_setupvalue(self.as_raw(), -2, 1) };
            if name.is_null() {
                // chunk has no upvalues, the table stays on the stack
                unsafe { ffi::lua_pop(self.as_raw(), 1) };
            }
        }

        Function::from_top(self)
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("state", &self.state.main)
            .field("thread", &self.thread)
            .field("owned", &self.state.owned)
            .finish()
    }
}

/// The main thread of the state `raw` belongs to.
unsafe fn main_of(raw: *mut ffi::lua_State) -> Option<NonNull<ffi::lua_State>> {
    unsafe {
        if ffi::lua_checkstack(raw, 1) == 0 {
            return None;
        }
        ffi::lua_rawgeti(raw, ffi::LUA_REGISTRYINDEX, ffi::LUA_RIDX_MAINTHREAD);
        let main = ffi::lua_tothread(raw, -1);
        ffi::lua_pop(raw, 1);
        NonNull::new(main)
    }
}
