//! Auth command handlers.

use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use visor_core::auth::{
    AuthError, AuthFlowController, AuthPhase, FederatedProvider, FederatedToken,
    HttpCredentialExchange, Session, SessionStore, TokenFuture, federated,
};
use visor_core::config::{Config, FederatedConfig, paths};

pub async fn login_password(
    config: &Config,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<()> {
    let store = SessionStore::load()?;
    if !confirm_replace_existing(&store)? {
        return Ok(());
    }

    let email = match email {
        Some(value) => value.to_string(),
        None => prompt_line("Email: ")?,
    };
    let password = match password {
        Some(value) => value.to_string(),
        None => prompt_line("Password: ")?,
    };

    let exchange = Arc::new(HttpCredentialExchange::from_config(config));
    let mut controller = AuthFlowController::new(store, exchange);
    controller.submit_password(&email, &password)?;

    finish_sign_in(controller).await
}

pub async fn sign_up(config: &Config, email: &str, password: &str) -> Result<()> {
    let store = SessionStore::load()?;
    if !confirm_replace_existing(&store)? {
        return Ok(());
    }

    let exchange = Arc::new(HttpCredentialExchange::from_config(config));
    let mut controller = AuthFlowController::new(store, exchange);
    controller.submit_sign_up(email, password)?;

    finish_sign_in(controller).await
}

pub async fn login_google(config: &Config) -> Result<()> {
    let store = SessionStore::load()?;
    if !confirm_replace_existing(&store)? {
        return Ok(());
    }

    let exchange = Arc::new(HttpCredentialExchange::from_config(config));
    let mut controller = AuthFlowController::new(store, exchange);
    let provider = Arc::new(TerminalFederatedProvider {
        config: config.federated.clone(),
    });
    controller.begin_federated(provider);

    finish_sign_in(controller).await
}

pub fn logout() -> Result<()> {
    let mut store = SessionStore::load()?;
    let path = paths::session_path();

    if store.sign_out()? {
        println!("✓ Signed out");
        println!("  Session removed from: {}", path.display());
    } else {
        println!("Not signed in (no session found).");
    }

    Ok(())
}

pub fn whoami() -> Result<()> {
    let store = SessionStore::load()?;

    match store.current_user() {
        Some(session) => {
            println!("Signed in as {}", describe(session));
            if let Some(email) = session.email.as_deref() {
                println!("  Email:   {email}");
            }
            println!("  Token:   {}", session.masked_token());
            println!("  Expires: {}", format_expiry(session.expires_at));
        }
        None => println!("Not signed in."),
    }

    Ok(())
}

/// Waits for the in-flight attempt and reports the outcome.
async fn finish_sign_in(mut controller: AuthFlowController) -> Result<()> {
    let phase = controller.next_transition().await;

    if phase == AuthPhase::LoggedIn {
        let session = controller
            .current_user()
            .context("session missing after sign-in")?;
        println!("✓ Signed in as {}", describe(session));
        println!("  Session saved to: {}", paths::session_path().display());
        return Ok(());
    }

    match controller.last_error() {
        Some(err) => Err(anyhow::Error::from(err.clone()).context("sign-in failed")),
        None => anyhow::bail!("sign-in failed"),
    }
}

/// When a session already exists, asks before replacing it.
fn confirm_replace_existing(store: &SessionStore) -> Result<bool> {
    let Some(session) = store.current_user() else {
        return Ok(true);
    };

    println!("Already signed in as {}", describe(session));
    print!("Replace the existing session? [y/N] ");
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().lock().read_line(&mut response)?;
    if response.trim().eq_ignore_ascii_case("y") {
        return Ok(true);
    }

    println!("Login cancelled.");
    Ok(false)
}

fn describe(session: &Session) -> String {
    session
        .display_name
        .clone()
        .or_else(|| session.email.clone())
        .unwrap_or_else(|| "(unnamed)".to_string())
}

fn format_expiry(expires_at: u64) -> String {
    i64::try_from(expires_at)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map_or_else(|| "unknown".to_string(), |dt| dt.to_rfc3339())
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Interactive federated sign-in: browser URL + localhost callback with a
/// manual paste fallback.
struct TerminalFederatedProvider {
    config: FederatedConfig,
}

impl FederatedProvider for TerminalFederatedProvider {
    fn launch_sign_in(&self) -> TokenFuture {
        let config = self.config.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || run_interactive_flow(&config))
                .await
                .map_err(|e| AuthError::cancelled(format!("sign-in flow aborted: {e}")))?
        })
    }
}

fn run_interactive_flow(config: &FederatedConfig) -> Result<FederatedToken, AuthError> {
    let pkce = federated::generate_pkce();
    let state = uuid::Uuid::new_v4().to_string();
    let callback_port = federated::random_local_port();
    let redirect_uri = federated::build_redirect_uri(callback_port);
    let auth_url = federated::build_auth_url(config, &pkce, &state, &redirect_uri);

    println!("To sign in with Google:");
    println!();
    println!("  1. A browser window will open (or visit the URL below)");
    println!("  2. Sign in with your Google account and authorize access");
    println!("  3. If redirected to localhost, return here to continue");
    println!("  4. Otherwise, paste the identity token or redirect URL");
    println!();
    println!("Authorization URL:");
    println!("  {auth_url}");
    println!();

    // Best effort, skip in tests
    if std::env::var("VISOR_NO_BROWSER").is_err() {
        let _ = open::that(&auth_url);
    }

    // Prefer local callback in interactive sessions, fall back to manual paste.
    let local_token = if io::stdin().is_terminal() {
        wait_for_callback(&state, callback_port)
    } else {
        None
    };

    let token = match local_token {
        Some(token) => token,
        None => {
            print!("Paste identity token (or full redirect URL): ");
            io::stdout()
                .flush()
                .map_err(|e| AuthError::cancelled(e.to_string()))?;

            let mut input = String::new();
            io::stdin()
                .lock()
                .read_line(&mut input)
                .map_err(|e| AuthError::cancelled(e.to_string()))?;

            let (token, provided_state) = federated::parse_authorization_input(&input);
            if let Some(provided) = provided_state
                && provided != state
            {
                return Err(AuthError::cancelled("State mismatch"));
            }
            token.ok_or_else(|| AuthError::cancelled("Identity token cannot be empty"))?
        }
    };

    Ok(FederatedToken::new(token))
}

fn wait_for_callback(state: &str, port: u16) -> Option<String> {
    let listener = match TcpListener::bind(format!("127.0.0.1:{port}")) {
        Ok(listener) => listener,
        Err(_) => return None,
    };
    let _ = listener.set_nonblocking(true);

    let (tx, rx) = std::sync::mpsc::channel::<Option<String>>();
    let state = state.to_string();

    std::thread::spawn(move || {
        let start = std::time::Instant::now();
        loop {
            match listener.accept() {
                Ok((mut stream, _)) => {
                    let mut buffer = [0u8; 2048];
                    let _ = stream.read(&mut buffer);
                    let request = String::from_utf8_lossy(&buffer);
                    let token = extract_token_from_request(&request, &state);
                    let response = match token.is_some() {
                        true => callback_success_response(),
                        false => callback_error_response(),
                    };
                    let _ = stream.write_all(response.as_bytes());
                    let _ = tx.send(token);
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > Duration::from_secs(120) {
                        let _ = tx.send(None);
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(_) => {
                    let _ = tx.send(None);
                    break;
                }
            }
        }
    });

    rx.recv_timeout(Duration::from_secs(120)).ok().flatten()
}

fn extract_token_from_request(request: &str, expected_state: &str) -> Option<String> {
    let mut lines = request.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let path = parts.next()?;

    let url = url::Url::parse(&format!("http://localhost{path}")).ok()?;
    if url.path() != federated::LOCAL_CALLBACK_PATH {
        return None;
    }
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())?;
    if state != expected_state {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
}

fn callback_success_response() -> String {
    let body = "<!doctype html><html><head><meta charset=\"utf-8\" /><title>Sign-in successful</title></head><body><p>Sign-in successful. Return to your terminal to continue.</p></body></html>";
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn callback_error_response() -> String {
    let body = "Invalid sign-in callback";
    format!(
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}
