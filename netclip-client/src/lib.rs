pub mod console;
pub mod frontend;

pub use console::{CommandError, ConsoleCommand, parse_command, run_console};
pub use frontend::{Frontend, IndicatorFrontend, MenuFrontend, frontend_for};
