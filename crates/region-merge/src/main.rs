mod commands;
mod error;
mod geojson;
mod logging;
mod settings;

use std::process::ExitCode;

fn main() -> ExitCode {
    let settings = settings::Settings::from_cli();
    let _logging = logging::setup_logging();

    match commands::run(settings.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
