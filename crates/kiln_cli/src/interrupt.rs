//! Interrupt trapping around guarded tool runs.
//!
//! While a filtered database is live the process must not die on Ctrl-C
//! before the original is restored. [`trap`] replaces the default
//! SIGINT/SIGTERM (Ctrl-C/Ctrl-Break on Windows) disposition with a handler
//! that only records the interrupt. The child tool still receives the
//! terminal's signal and exits, the guard restores, and the command then
//! reports the interrupt with exit code 130.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

/// Exit code reported after an interrupted run.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Handle to the interrupt flag set by the signal watcher.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// Whether an interrupt has been received since trapping began.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Installs the signal handlers and starts the watcher thread.
///
/// Handlers are registered before this returns, so no interrupt arriving
/// after the call can take the default disposition. The watcher lives for
/// the rest of the process.
pub fn trap() -> std::io::Result<Interrupt> {
    let interrupt = Interrupt::default();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let listeners = {
        let _context = runtime.enter();
        listeners::register()?
    };

    let watcher = interrupt.clone();
    std::thread::Builder::new()
        .name("kiln-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                for listener in listeners {
                    let watcher = watcher.clone();
                    tokio::spawn(async move {
                        let mut listener = listener;
                        while listener.recv().await.is_some() {
                            warn!("interrupt received, waiting for the running tool to exit");
                            watcher.set();
                        }
                    });
                }
                std::future::pending::<()>().await;
            });
        })?;

    debug!("interrupt handlers installed");
    Ok(interrupt)
}

#[cfg(unix)]
mod listeners {
    use tokio::signal::unix::{signal, Signal, SignalKind};

    pub(super) struct Listener(Signal);

    impl Listener {
        pub(super) async fn recv(&mut self) -> Option<()> {
            self.0.recv().await
        }
    }

    pub(super) fn register() -> std::io::Result<Vec<Listener>> {
        Ok(vec![
            Listener(signal(SignalKind::interrupt())?),
            Listener(signal(SignalKind::terminate())?),
        ])
    }
}

#[cfg(windows)]
mod listeners {
    use tokio::signal::windows::{ctrl_break, ctrl_c, CtrlBreak, CtrlC};

    pub(super) enum Listener {
        C(CtrlC),
        Break(CtrlBreak),
    }

    impl Listener {
        pub(super) async fn recv(&mut self) -> Option<()> {
            match self {
                Listener::C(s) => s.recv().await,
                Listener::Break(s) => s.recv().await,
            }
        }
    }

    pub(super) fn register() -> std::io::Result<Vec<Listener>> {
        Ok(vec![Listener::C(ctrl_c()?), Listener::Break(ctrl_break()?)])
    }
}
