use std::process;

use converge::core::config::ConfigError;
use converge::engine::ExitStatus;
use converge::ui::output;

fn main() {
    match converge::cli::run() {
        Ok(status) => process::exit(status.code()),
        Err(err) => {
            output::error(format!("{:#}", err));
            let status = if err.downcast_ref::<ConfigError>().is_some() {
                ExitStatus::ConfigError
            } else {
                ExitStatus::Failed
            };
            process::exit(status.code());
        }
    }
}
