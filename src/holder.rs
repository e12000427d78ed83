//! One lazily-created instance per OS thread, destroyed at thread exit.

use crate::Error;
use std::mem::ManuallyDrop;
use std::ptr;

/// Holder that owns at most one instance of `T` per OS thread.
///
/// Each thread that calls [`get`](Self::get) lazily builds its own instance
/// with the closure captured at holder construction; the instance lives in
/// an OS thread-local slot and is destroyed when its thread exits. The log
/// front-end uses this to hand every producer thread its own
/// [`ThreadInputBuffer`](crate::ThreadInputBuffer).
///
/// Built directly on the platform's thread-local key API rather than the
/// `thread_local!` macro: the builder is captured per holder instance at
/// runtime, not per static, and destruction order against the slot matters
/// (see `drop_slot`).
///
/// # Example
///
/// ```
/// use logring::PerThread;
/// use std::cell::Cell;
///
/// let counter = PerThread::new(|| Ok(Cell::new(0u64))).unwrap();
/// let c = counter.get().unwrap();
/// c.set(c.get() + 1);
/// assert_eq!(counter.get().unwrap().get(), 1);
/// ```
pub struct PerThread<T: 'static> {
    key: libc::pthread_key_t,
    init: Box<dyn Fn() -> Result<T, Error> + Send + Sync>,
}

// SAFETY: concurrent access from many threads touches only the immutable
// key and the Send + Sync builder; each instance of T is created, used and
// destroyed on a single thread and never crosses to another.
unsafe impl<T: 'static> Send for PerThread<T> {}
unsafe impl<T: 'static> Sync for PerThread<T> {}

/// Heap cell an instance lives in. Carries the key so the destructor
/// callback can restore the slot (see `drop_slot`).
struct Slot<T> {
    key: libc::pthread_key_t,
    value: ManuallyDrop<T>,
}

impl<T: 'static> PerThread<T> {
    /// Registers a thread-local key whose instances are built by `init`.
    ///
    /// `init` runs once per accessing thread, on that thread, at the first
    /// [`get`](Self::get).
    pub fn new<F>(init: F) -> Result<Self, Error>
    where
        F: Fn() -> Result<T, Error> + Send + Sync + 'static,
    {
        let mut key: libc::pthread_key_t = 0;
        // SAFETY: key points at a live pthread_key_t; the destructor is a
        // plain function matching the required signature.
        let rc = unsafe { libc::pthread_key_create(&mut key, Some(drop_slot::<T>)) };
        if rc != 0 {
            return Err(Error::from_errno(rc));
        }
        Ok(Self {
            key,
            init: Box::new(init),
        })
    }

    /// Returns the calling thread's instance, creating it on first call.
    ///
    /// Between the first call on a thread and that thread's exit, every call
    /// returns a reference to the same instance. First-time creation can
    /// fail with whatever `init` reports, or with the error the OS returns
    /// when registering the instance in the slot.
    pub fn get(&self) -> Result<&T, Error> {
        // SAFETY: the key is live for as long as the holder; a non-null
        // slot pointer is one we boxed in create() and have not freed.
        unsafe {
            let slot = libc::pthread_getspecific(self.key).cast::<Slot<T>>();
            if !slot.is_null() {
                return Ok(&(*slot).value);
            }
        }
        self.create()
    }

    /// Slow path of [`get`]: build the instance and register it.
    #[cold]
    fn create(&self) -> Result<&T, Error> {
        let value = (self.init)()?;
        let slot = Box::into_raw(Box::new(Slot {
            key: self.key,
            value: ManuallyDrop::new(value),
        }));
        // SAFETY: slot is a valid owned pointer; on failure it never became
        // reachable through the key, so it is torn down here in full.
        unsafe {
            let rc = libc::pthread_setspecific(self.key, slot.cast());
            if rc != 0 {
                ManuallyDrop::drop(&mut (*slot).value);
                drop(Box::from_raw(slot));
                return Err(Error::from_errno(rc));
            }
            Ok(&(*slot).value)
        }
    }
}

impl<T: 'static> Drop for PerThread<T> {
    fn drop(&mut self) {
        // SAFETY: same slot ownership reasoning as in drop_slot below. Only
        // the calling thread's instance can be reached here; instances on
        // other still-live threads follow the platform's key-deletion
        // semantics (their destructors no longer run).
        unsafe {
            let slot = libc::pthread_getspecific(self.key).cast::<Slot<T>>();
            if !slot.is_null() {
                // The slot stays populated while the value drops so that
                // re-entrant get() calls made during destruction observe
                // this instance instead of building a fresh one.
                ManuallyDrop::drop(&mut (*slot).value);
                libc::pthread_setspecific(self.key, ptr::null_mut());
                drop(Box::from_raw(slot));
            }
            libc::pthread_key_delete(self.key);
        }
    }
}

/// Thread-exit destructor the OS invokes with the slot pointer.
unsafe extern "C" fn drop_slot<T>(p: *mut libc::c_void) {
    let slot = p.cast::<Slot<T>>();
    // The OS clears the slot before invoking this callback. Restore it so a
    // destructor on T that re-enters get() on the same thread (the input
    // ring does, through the front-end's commit()) observes the existing
    // instance instead of building a fresh one mid-teardown.
    //
    // If the slot cannot be restored (or later cleared) the thread-local
    // table is out of memory during thread teardown; there is no caller to
    // surface an error to and a half-torn slot would invite a second
    // destructor pass over freed memory.
    // SAFETY: p is the pointer create() registered for this thread; the key
    // inside it is still live.
    unsafe {
        if libc::pthread_setspecific((*slot).key, p) != 0 {
            std::process::abort();
        }
        ManuallyDrop::drop(&mut (*slot).value);
        if libc::pthread_setspecific((*slot).key, ptr::null_mut()) != 0 {
            std::process::abort();
        }
        drop(Box::from_raw(slot));
    }
}
