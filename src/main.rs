mod ipc;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing::{info, warn};

fn main() {
    resultd::logging::init();

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = std::env::var_os("RESULTD_WORKSPACE").map(PathBuf::from) {
        match ipc::open_workspace(&mut state, path.clone()) {
            Ok(()) => info!(workspace = %path.display(), "workspace opened from environment"),
            Err(e) => warn!(workspace = %path.display(), error = %e, "could not open workspace from environment"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to; report on the protocol stream anyway.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
