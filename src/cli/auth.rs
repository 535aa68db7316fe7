//! Auth CLI commands
//!
//! Sign in to, sign out of and inspect the storage provider.

use chrono::Utc;
use clap::Subcommand;

use super::{AppContext, TOKEN_ENV};
use crate::auth::CredentialProvider;
use crate::display::format_status;
use crate::error::{BackupError, BackupResult};
use crate::notify::ConsoleSink;
use crate::services::BackupService;

/// Auth subcommands
#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store an access token for the provider
    Login {
        /// Token to store (prompted for when omitted)
        #[arg(long)]
        token: Option<String>,
    },

    /// Forget the stored token
    Logout,

    /// Show sign-in state and backup count
    Status,
}

/// Handle an auth command
pub async fn handle_auth_command(ctx: &AppContext, cmd: AuthCommands) -> BackupResult<()> {
    match cmd {
        AuthCommands::Login { token } => {
            if !ctx.provider.requires_token() {
                println!("The {} provider needs no sign-in.", ctx.provider);
                return Ok(());
            }

            let token = match token {
                Some(token) => token,
                None => rpassword::prompt_password(format!("{} token: ", ctx.provider))
                    .map_err(|e| BackupError::Io(format!("Failed to read token: {}", e)))?,
            };

            let store = ctx.token_store();
            store.store_token(&token)?;
            let session = store.get_session().await?;

            match ctx.engine.account_name_for(&session).await {
                Ok(Some(account)) => println!("Signed in to {} as {}", ctx.provider, account),
                Ok(None) => println!("Signed in to {}", ctx.provider),
                Err(e) if e.is_auth_required() => {
                    store.sign_out().await?;
                    println!("The {} token was rejected.", ctx.provider);
                    return Err(e);
                }
                Err(e) => {
                    println!("Token stored, but the provider could not be reached.");
                    return Err(e);
                }
            }

            if std::env::var(TOKEN_ENV).map_or(false, |t| !t.trim().is_empty()) {
                println!(
                    "Note: {} is set and is used instead of the stored token.",
                    TOKEN_ENV
                );
            }
        }

        AuthCommands::Logout => {
            ctx.engine.sign_out().await?;
            println!("Signed out of {}.", ctx.provider);
        }

        AuthCommands::Status => {
            let sink = ConsoleSink::quiet();
            let service = BackupService::new(&ctx.engine, ctx.data.as_ref(), &sink);
            let report = service.status().await?;
            print!("{}", format_status(&report, Utc::now()));
        }
    }

    Ok(())
}
