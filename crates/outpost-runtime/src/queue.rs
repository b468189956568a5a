//! The shared data queue — the kernel IPC path between workers and the
//! coordinator.
//!
//! A named POSIX message queue with fixed-size slots. The host creates it
//! once before forking anything; workers and the coordinator inherit the
//! descriptor across fork, so no process re-opens or re-initializes the
//! queue. Many writers, one reader; the kernel serializes slot delivery.
//!
//! Send never blocks — a full queue is reported to the caller. Receive
//! blocks up to a caller-supplied deadline. Both are built on the timed
//! variants of the mq syscalls so one inherited blocking descriptor serves
//! both sides.

use std::ffi::CString;
use std::io;
use std::time::Duration;

use outpost_core::wire::SLOT_BYTES;

/// Slots the production queue is created with. Kernels cap `mq_maxmsg` (see
/// /proc/sys/fs/mqueue/msg_max); creation falls back to a conservative
/// capacity when this is rejected.
pub const DEFAULT_CAPACITY: usize = 100;

const FALLBACK_CAPACITY: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,

    #[error("queue is closed")]
    Closed,

    #[error("queue name '{0}' is not usable")]
    BadName(String),

    #[error("queue operation failed: {0}")]
    Os(#[from] io::Error),
}

/// One named kernel message queue.
pub struct SharedQueue {
    mqd: libc::mqd_t,
    name: CString,
    owner: bool,
}

impl SharedQueue {
    /// Create the named queue with `capacity` slots of `SLOT_BYTES` each.
    /// Called once by the host parent before any fork. A stale queue left
    /// by a crashed previous run is removed first.
    pub fn create(name: &str, capacity: usize) -> Result<Self, QueueError> {
        let cname = queue_name(name)?;

        // Safety: cname is a valid NUL-terminated string.
        unsafe { libc::mq_unlink(cname.as_ptr()) };

        let oflag = libc::O_CREAT | libc::O_EXCL | libc::O_RDWR;
        let mqd = match Self::open_with_capacity(&cname, oflag, capacity) {
            Ok(mqd) => mqd,
            Err(err) if err.raw_os_error() == Some(libc::EINVAL) => {
                tracing::debug!(
                    name,
                    capacity,
                    fallback = FALLBACK_CAPACITY,
                    "kernel rejected queue capacity, retrying with fallback"
                );
                Self::open_with_capacity(&cname, oflag, FALLBACK_CAPACITY)?
            }
            Err(err) => return Err(err.into()),
        };

        tracing::debug!(name, "shared queue created");
        Ok(Self {
            mqd,
            name: cname,
            owner: true,
        })
    }

    /// Open an existing queue by name. Production processes inherit the
    /// creator's descriptor across fork instead; this is for tooling.
    pub fn open(name: &str) -> Result<Self, QueueError> {
        let cname = queue_name(name)?;
        // Safety: cname is a valid NUL-terminated string.
        let mqd = unsafe { libc::mq_open(cname.as_ptr(), libc::O_RDWR) };
        if mqd == -1 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(Self {
            mqd,
            name: cname,
            owner: false,
        })
    }

    fn open_with_capacity(
        cname: &CString,
        oflag: libc::c_int,
        capacity: usize,
    ) -> io::Result<libc::mqd_t> {
        // Safety: attr is a fully initialized mq_attr and cname is a valid
        // NUL-terminated string.
        let mqd = unsafe {
            let mut attr: libc::mq_attr = std::mem::zeroed();
            attr.mq_maxmsg = capacity as libc::c_long;
            attr.mq_msgsize = SLOT_BYTES as libc::c_long;
            libc::mq_open(
                cname.as_ptr(),
                oflag,
                0o600 as libc::mode_t,
                &mut attr as *mut libc::mq_attr,
            )
        };
        if mqd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(mqd)
    }

    /// Send one slot image without blocking. `Full` when no slot is free.
    /// One send maps to exactly one receive of the same byte image.
    pub fn try_send(&self, slot: &[u8], priority: u32) -> Result<(), QueueError> {
        let deadline = deadline_after(Duration::ZERO)?;
        // Safety: slot points at slot.len() readable bytes and deadline is a
        // valid timespec.
        let rc = unsafe {
            libc::mq_timedsend(
                self.mqd,
                slot.as_ptr() as *const libc::c_char,
                slot.len(),
                priority,
                &deadline,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        match io::Error::last_os_error() {
            err if matches!(err.raw_os_error(), Some(libc::ETIMEDOUT) | Some(libc::EAGAIN)) => {
                Err(QueueError::Full)
            }
            err if err.raw_os_error() == Some(libc::EBADF) => Err(QueueError::Closed),
            err => Err(err.into()),
        }
    }

    /// Receive one slot image, blocking up to `timeout`. `None` when the
    /// deadline passes (or the wait is interrupted) with nothing received.
    pub fn timed_receive(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<usize>, QueueError> {
        let deadline = deadline_after(timeout)?;
        let mut priority: libc::c_uint = 0;
        // Safety: buf points at buf.len() writable bytes and deadline is a
        // valid timespec.
        let received = unsafe {
            libc::mq_timedreceive(
                self.mqd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut priority,
                &deadline,
            )
        };
        if received >= 0 {
            return Ok(Some(received as usize));
        }
        match io::Error::last_os_error() {
            err if matches!(err.raw_os_error(), Some(libc::ETIMEDOUT) | Some(libc::EINTR)) => {
                Ok(None)
            }
            err if err.raw_os_error() == Some(libc::EBADF) => Err(QueueError::Closed),
            err => Err(err.into()),
        }
    }
}

impl Drop for SharedQueue {
    fn drop(&mut self) {
        // Safety: mqd came from mq_open and the name is NUL-terminated.
        unsafe {
            libc::mq_close(self.mqd);
            if self.owner {
                libc::mq_unlink(self.name.as_ptr());
            }
        }
    }
}

fn queue_name(name: &str) -> Result<CString, QueueError> {
    let with_slash = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };
    CString::new(with_slash).map_err(|_| QueueError::BadName(name.to_string()))
}

fn deadline_after(timeout: Duration) -> Result<libc::timespec, QueueError> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // Safety: now is a valid timespec out-parameter.
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    let mut sec = now.tv_sec + timeout.as_secs() as libc::time_t;
    let mut nsec = now.tv_nsec + timeout.subsec_nanos() as libc::c_long;
    if nsec >= 1_000_000_000 {
        sec += 1;
        nsec -= 1_000_000_000;
    }
    Ok(libc::timespec {
        tv_sec: sec,
        tv_nsec: nsec,
    })
}
