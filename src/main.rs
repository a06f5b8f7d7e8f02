use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use log::*;

use memsim::shell::{self, Response, Session};

fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    // An optional first argument initializes memory right away,
    // otherwise the user has to start with 'init'.
    let mut session = match std::env::args().nth(1) {
        Some(arg) => {
            let total_size = arg
                .parse()
                .with_context(|| format!("Invalid total memory size '{arg}'."))?;
            Session::with_size(total_size)?
        }
        None => Session::new(),
    };

    match session.allocator() {
        Some(allocator) => println!("{}", shell::render(allocator)),
        None => println!("{}", shell::HELP),
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();
    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match session.run_line(&line) {
            Ok(Response::Quit) => break,
            Ok(Response::Help) => println!("{}", shell::HELP),
            Ok(response) => {
                if response != Response::Snapshot {
                    info!("{response}");
                }
            }
            Err(error) => warn!("{error}"),
        }

        // Like after any action in the simulator, show the block
        // list again, even when the action failed.
        if let Some(allocator) = session.allocator() {
            println!("{}", shell::render(allocator));
        }
    }

    info!("Exiting the simulator.");
    Ok(())
}
