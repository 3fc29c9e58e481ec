//! SIGINT/SIGTERM → cancellation token

use anyhow::Result;
use tracing::info;
use txrm_ingest::CancellationToken;

/// Cancel `token` on the first interrupt or termination signal.
pub fn install(token: &CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handler_token = token.clone();
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, finishing current file and stopping...", sig);
                handler_token.cancel();
            }
        });
    }

    #[cfg(windows)]
    {
        let handler_token = token.clone();
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, finishing current file and stopping...");
            handler_token.cancel();
        })?;
    }

    Ok(())
}
