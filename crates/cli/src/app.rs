use crate::cli::{Cli, Commands};
use crate::commands::VerifyArgs;
use crate::json::ErrorJson;
use anyhow::Result;
use console::style;

pub fn run(cli: Cli) -> Result<()> {
    let json = cli.json;

    let result = match cli.command {
        Commands::Changelog {
            input,
            skip_versions,
            just_one,
        } => crate::commands::changelog(input, skip_versions, just_one, json),

        Commands::Verify {
            input,
            keyrings,
            keyring_dirs,
            backend,
            gpgv,
            gpg,
            timeout,
            cleartext,
        } => crate::commands::verify(
            VerifyArgs {
                input,
                keyrings,
                keyring_dirs,
                backend,
                gpgv,
                gpg,
                timeout,
                cleartext,
            },
            json,
        ),
    };

    if let Err(e) = &result {
        if json {
            let causes: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
            let payload = ErrorJson {
                status: "error",
                error: e.to_string(),
                causes,
            };
            println!("{}", serde_json::to_string(&payload)?);
        } else {
            eprintln!("\n{} {}", style("[ERROR]").red().bold(), style(&e).red());

            for (i, cause) in e.chain().skip(1).enumerate() {
                if i == 0 {
                    eprintln!("\n    Caused by:");
                }
                eprintln!("      - {}", style(cause).red());
            }
            eprintln!();
        }
    }

    result
}
