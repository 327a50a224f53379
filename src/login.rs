use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::auth::{authorize_url, exchange_code, save_token_file};
use crate::config::Config;

pub struct LoginArgs {
    pub config_path: PathBuf,
}

/// Interactive authorization-code flow: print the authorization URL, read
/// the returned code from standard input, exchange it, store the tokens.
pub async fn run_login(args: LoginArgs) -> Result<()> {
    let cfg = Config::load(&args.config_path)?;
    cfg.require_redirect_uri()?;

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("build http client")?;

    let url = authorize_url(&cfg.client_id, &cfg.redirect_uri)?;
    println!("Please go to\n\n  {url}\n\nand authorize the application.");

    let code = prompt_line("Paste the value of code: ")?;
    if code.is_empty() {
        anyhow::bail!("no authorization code given");
    }

    let tokens = exchange_code(
        &http,
        &cfg.client_id,
        &cfg.client_secret,
        &cfg.redirect_uri,
        &code,
    )
    .await?;
    if tokens.refresh_token.is_none() {
        anyhow::bail!("token response carried no refresh token; check the requested scopes");
    }

    let token_path = cfg.token_path();
    save_token_file(&token_path, &tokens)?;
    println!("Logged in; tokens saved to {}", token_path.display());
    Ok(())
}

fn prompt_line(prompt: &str) -> Result<String> {
    let mut out = io::stderr();
    let _ = out.write_all(prompt.as_bytes());
    let _ = out.flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).context("read stdin")?;
    Ok(buf.trim().to_string())
}
