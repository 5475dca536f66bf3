//! Config subcommand handlers.

use narwal_config::Profile;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let text = toml::to_string_pretty(&cfg)?;
            output::print_output(&text, global.quiet);
            Ok(())
        }

        ConfigCommand::Add {
            name,
            host,
            default,
        } => {
            let mut cfg = config::load(global)?;
            let profile = Profile {
                device_id: global.device_id.clone(),
                port: global.port,
                ..Profile::for_host(host)
            };
            // Reject bad values before they reach the file.
            narwal_config::profile_to_session_config(&profile, &cfg.defaults)?;

            cfg.profiles.insert(name.clone(), profile);
            if default || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }
            config::save(global, &cfg)?;
            output::print_output(&format!("Profile '{name}' saved"), global.quiet);
            Ok(())
        }

        ConfigCommand::Remove { name } => {
            let mut cfg = config::load(global)?;
            if cfg.profiles.remove(&name).is_none() {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }
            if cfg.default_profile.as_deref() == Some(name.as_str()) {
                cfg.default_profile = None;
            }
            config::save(global, &cfg)?;
            output::print_output(&format!("Profile '{name}' removed"), global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load(global)?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save(global, &cfg)?;
            output::print_output(&format!("Default profile is now '{name}'"), global.quiet);
            Ok(())
        }
    }
}
