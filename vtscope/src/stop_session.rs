//! Stopping the debuggee
//!
//! A [`StopSession`] ptrace-attaches to every thread of the target, which
//! stops them, and detaches on drop, which resumes them. Memory is only read
//! while a session is alive, so one inspection sees one consistent stop.
//!
//! All ptrace requests for a tracee must come from the thread that attached,
//! so a session must be created and dropped on the same thread.

#![allow(unsafe_code)] // ptrace() and waitpid() require unsafe

use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::ptr;

use crate::domain::{Pid, SessionError, Tid};

/// Threads of one process, stopped until drop
#[derive(Debug)]
pub struct StopSession {
    pid: Pid,
    threads: Vec<StoppedThread>,
}

#[derive(Debug)]
struct StoppedThread {
    tid: Tid,
    /// Signal that arrived while stopping; delivered again on detach
    pending_signal: i32,
}

impl StopSession {
    /// Attach to and stop every thread of `pid`
    ///
    /// Threads spawned while attaching are picked up by listing the task
    /// directory again until no new thread shows up. Threads that exit while
    /// being stopped are skipped.
    ///
    /// # Errors
    /// Returns [`SessionError::ProcessNotFound`] if the process is gone and
    /// [`SessionError::AttachFailed`] if a thread cannot be attached (usually
    /// permissions). Threads already stopped are resumed before returning.
    pub fn attach(pid: Pid) -> Result<Self, SessionError> {
        let mut session = Self { pid, threads: Vec::new() };
        let mut seen = BTreeSet::new();

        loop {
            let tids = list_threads(pid).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => SessionError::ProcessNotFound(pid),
                _ => SessionError::Io(e),
            })?;
            let new: Vec<Tid> = tids.into_iter().filter(|t| seen.insert(t.0)).collect();
            if new.is_empty() {
                break;
            }
            for tid in new {
                match stop_thread(tid) {
                    Ok(pending_signal) => {
                        session.threads.push(StoppedThread { tid, pending_signal });
                    }
                    Err(SessionError::ThreadExited(tid)) => debug!("{tid} exited while attaching"),
                    Err(e) => return Err(e),
                }
            }
        }

        if session.threads.is_empty() {
            return Err(SessionError::ProcessNotFound(pid));
        }
        debug!("Stopped {} threads of {pid}", session.threads.len());
        Ok(session)
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Threads held stopped by this session
    pub fn threads(&self) -> impl Iterator<Item = Tid> + '_ {
        self.threads.iter().map(|t| t.tid)
    }
}

impl Drop for StopSession {
    #[allow(clippy::cast_sign_loss)]
    fn drop(&mut self) {
        for thread in &self.threads {
            // SAFETY: detaching a tracee we attached; arguments are plain integers
            let rc = unsafe {
                libc::ptrace(
                    libc::PTRACE_DETACH,
                    thread.tid.0,
                    ptr::null_mut::<libc::c_void>(),
                    thread.pending_signal as usize as *mut libc::c_void,
                )
            };
            if rc == -1 {
                let err = io::Error::last_os_error();
                // ESRCH: the thread exited while stopped
                if err.raw_os_error() != Some(libc::ESRCH) {
                    warn!("Failed to detach from {}: {err}", thread.tid);
                }
            }
        }
        debug!("Resumed {}", self.pid);
    }
}

/// List the threads of a process from `/proc/<pid>/task`
///
/// # Errors
/// Returns an error if the task directory cannot be read.
pub fn list_threads(pid: Pid) -> io::Result<Vec<Tid>> {
    let mut tids: Vec<Tid> = fs::read_dir(format!("/proc/{}/task", pid.0))?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<i32>().ok())
        .map(Tid)
        .collect();
    tids.sort_by_key(|t| t.0);
    Ok(tids)
}

/// Attach to one thread and wait until it is stopped by our SIGSTOP
///
/// Returns the signal to re-deliver on detach (0 for none).
fn stop_thread(tid: Tid) -> Result<i32, SessionError> {
    // SAFETY: PTRACE_ATTACH takes no addr/data
    let rc = unsafe {
        libc::ptrace(
            libc::PTRACE_ATTACH,
            tid.0,
            ptr::null_mut::<libc::c_void>(),
            ptr::null_mut::<libc::c_void>(),
        )
    };
    if rc == -1 {
        let source = io::Error::last_os_error();
        if source.raw_os_error() == Some(libc::ESRCH) {
            return Err(SessionError::ThreadExited(tid));
        }
        return Err(SessionError::AttachFailed { tid, source });
    }

    let mut pending_signal = 0;
    loop {
        match wait_for(tid)? {
            ThreadStatus::Stopped(libc::SIGSTOP) => return Ok(pending_signal),
            ThreadStatus::Stopped(signal) => {
                // Another signal won the race; keep it for later and let the
                // thread run on to our SIGSTOP
                debug!("{tid} stopped by signal {signal} while attaching");
                pending_signal = signal;
                // SAFETY: tid is our tracee and currently stopped
                let rc = unsafe {
                    libc::ptrace(
                        libc::PTRACE_CONT,
                        tid.0,
                        ptr::null_mut::<libc::c_void>(),
                        ptr::null_mut::<libc::c_void>(),
                    )
                };
                if rc == -1 {
                    return Err(SessionError::WaitFailed {
                        tid,
                        source: io::Error::last_os_error(),
                    });
                }
            }
            ThreadStatus::Gone => return Err(SessionError::ThreadExited(tid)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadStatus {
    Stopped(i32),
    Gone,
}

fn wait_for(tid: Tid) -> Result<ThreadStatus, SessionError> {
    let mut status = 0;
    loop {
        // SAFETY: status points to a live c_int
        let rc = unsafe { libc::waitpid(tid.0, &raw mut status, libc::__WALL) };
        if rc != -1 {
            return Ok(classify(status));
        }
        let source = io::Error::last_os_error();
        match source.raw_os_error() {
            Some(libc::EINTR) => {}
            Some(libc::ECHILD) => return Ok(ThreadStatus::Gone),
            _ => return Err(SessionError::WaitFailed { tid, source }),
        }
    }
}

fn classify(status: i32) -> ThreadStatus {
    if libc::WIFSTOPPED(status) {
        ThreadStatus::Stopped(libc::WSTOPSIG(status))
    } else {
        ThreadStatus::Gone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Child, Command};

    #[allow(clippy::cast_possible_wrap)]
    fn child_pid(child: &Child) -> Pid {
        Pid(child.id() as i32)
    }

    fn proc_state(pid: Pid) -> char {
        let stat = fs::read_to_string(format!("/proc/{}/stat", pid.0)).unwrap();
        let after_comm = &stat[stat.rfind(')').unwrap() + 2..];
        after_comm.chars().next().unwrap()
    }

    #[test]
    fn test_classify() {
        // Encodings from <sys/wait.h>: stopped is (sig << 8) | 0x7f
        assert_eq!(classify((libc::SIGSTOP << 8) | 0x7f), ThreadStatus::Stopped(libc::SIGSTOP));
        assert_eq!(classify((libc::SIGUSR1 << 8) | 0x7f), ThreadStatus::Stopped(libc::SIGUSR1));
        // exited with code 1
        assert_eq!(classify(1 << 8), ThreadStatus::Gone);
        // killed by SIGKILL
        assert_eq!(classify(libc::SIGKILL), ThreadStatus::Gone);
    }

    #[test]
    fn test_list_own_threads() {
        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid(std::process::id() as i32);
        let tids = list_threads(pid).unwrap();
        assert!(tids.contains(&Tid(pid.0)));
    }

    #[test]
    fn test_missing_process() {
        let err = StopSession::attach(Pid(999_999_999)).unwrap_err();
        assert!(matches!(err, SessionError::ProcessNotFound(Pid(999_999_999))));
    }

    #[test]
    fn test_stop_and_resume_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child_pid(&child);

        match StopSession::attach(pid) {
            Ok(session) => {
                assert_eq!(session.pid(), pid);
                assert_eq!(session.threads().collect::<Vec<_>>(), vec![Tid(pid.0)]);
                // 't' is "tracing stop"
                assert_eq!(proc_state(pid), 't');
                drop(session);
            }
            Err(SessionError::AttachFailed { source, .. })
                if source.kind() == io::ErrorKind::PermissionDenied =>
            {
                eprintln!("skipping: ptrace not permitted here");
            }
            Err(e) => panic!("attach failed: {e}"),
        }

        child.kill().unwrap();
        child.wait().unwrap();
    }
}
