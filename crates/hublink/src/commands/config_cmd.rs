//! Config subcommand handlers.

use std::fmt::Write as _;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking the plaintext token.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    for name in config::profile_names(cfg) {
        let p = &cfg.profiles[&name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "url = \"{}\"", p.url);
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"****\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(ms) = p.optimistic_window_ms {
            let _ = writeln!(out, "optimistic_window_ms = {ms}");
        }
        if let Some(ms) = p.media_confirm_window_ms {
            let _ = writeln!(out, "media_confirm_window_ms = {ms}");
        }
        if let Some(ms) = p.media_ceiling_ms {
            let _ = writeln!(out, "media_ceiling_ms = {ms}");
        }
        if let Some(secs) = p.backoff_max_secs {
            let _ = writeln!(out, "backoff_max_secs = {secs}");
        }
        if let Some(attempts) = p.reconnect_attempts {
            let _ = writeln!(out, "reconnect_attempts = {attempts}");
        }
    }

    out.trim_end().to_owned()
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn prompt_token() -> Result<String, CliError> {
    let token = rpassword::prompt_password("Access token: ").map_err(prompt_err)?;
    let token = token.trim().to_owned();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            name,
            url,
            token_env,
            plaintext,
            no_token,
        } => {
            config::parse_url(&url)?;
            let mut cfg = config::load_config(global)?;

            let mut profile = Profile {
                url,
                token_env,
                ..Profile::default()
            };
            if !no_token && profile.token_env.is_none() {
                let token = prompt_token()?;
                if plaintext {
                    profile.token = Some(token);
                } else {
                    config::store_token(&name, &token)?;
                    eprintln!("   token stored in system keyring");
                }
            }

            if cfg.profiles.is_empty() || cfg.default_profile.is_none() {
                cfg.default_profile = Some(name.clone());
            }
            cfg.profiles.insert(name.clone(), profile);
            config::save_config(&cfg, global)?;

            if !global.quiet {
                eprintln!(
                    "Profile '{name}' saved to {}",
                    config::config_path(global).display()
                );
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config(global)?;
            output::print_output(&format_config_redacted(&cfg), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config(global)?;
            let active = config::active_profile_name(global, &cfg);
            let lines: Vec<String> = config::profile_names(&cfg)
                .into_iter()
                .map(|name| {
                    let marker = if name == active { "*" } else { " " };
                    format!("{marker} {name}")
                })
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config(global)?;
            config::find_profile(&cfg, &name)?;
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg, global)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetToken { profile } => {
            let cfg = config::load_config(global)?;
            let name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            config::find_profile(&cfg, &name)?;
            let token = prompt_token()?;
            config::store_token(&name, &token)?;
            if !global.quiet {
                eprintln!("Token for '{name}' stored in system keyring");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_view_masks_tokens() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "home".into(),
            Profile {
                url: "http://hub.local:8123".into(),
                token: Some("very-secret".into()),
                optimistic_window_ms: Some(3000),
                reconnect_attempts: Some(5),
                ..Profile::default()
            },
        );

        let shown = format_config_redacted(&cfg);
        assert!(shown.contains("[profiles.home]"));
        assert!(shown.contains("token = \"****\""));
        assert!(shown.contains("optimistic_window_ms = 3000"));
        assert!(shown.contains("reconnect_attempts = 5"));
        assert!(!shown.contains("very-secret"));
    }
}
