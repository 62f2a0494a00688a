//! Auth command - manage the API token in the secure store.

use anyhow::{Context, Result, bail};
use vitals_store::StorageFacade;

use crate::cli::AuthAction;
use crate::format::FormatOptions;
use crate::style;

pub fn cmd_auth(action: AuthAction, storage: &StorageFacade, opts: &FormatOptions) -> Result<()> {
    match action {
        AuthAction::Login { token } => {
            let token = token.trim();
            if token.is_empty() {
                bail!("Token must not be empty");
            }
            storage
                .set_auth_token(token)
                .context("Failed to store API token")?;
            println!("{}", style::format_success("API token stored", opts.no_color));
        }
        AuthAction::Logout => {
            if storage.clear_auth_token().context("Failed to remove API token")? {
                println!("{}", style::format_success("API token removed", opts.no_color));
            } else {
                println!("No API token stored");
            }
        }
        AuthAction::Status => {
            let stored = storage
                .auth_token()
                .context("Failed to read API token")?
                .is_some();
            println!("API token: {}", if stored { "stored" } else { "not set" });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_logout() {
        let storage = StorageFacade::open_in_memory().unwrap();
        let opts = FormatOptions::new(true);

        cmd_auth(AuthAction::Login { token: " abc ".into() }, &storage, &opts).unwrap();
        assert_eq!(storage.auth_token().unwrap().as_deref(), Some("abc"));

        cmd_auth(AuthAction::Logout, &storage, &opts).unwrap();
        assert!(storage.auth_token().unwrap().is_none());
    }

    #[test]
    fn test_empty_token_rejected() {
        let storage = StorageFacade::open_in_memory().unwrap();
        let result = cmd_auth(
            AuthAction::Login { token: "  ".into() },
            &storage,
            &FormatOptions::new(true),
        );
        assert!(result.is_err());
        assert!(storage.auth_token().unwrap().is_none());
    }
}
