//! Command-line front end.
//!
//! An executable that embeds a dispatcher calls [`main`] from its own `main` and exits with the
//! returned code:
//!
//! ```rust,no_run
//! # use forthboot::engine::{DispatchStrategy, Engine, MachineState, PrimitiveTable};
//! # struct Interpreter { table: PrimitiveTable }
//! # impl Engine for Interpreter {
//! #     fn primitives(&self) -> &PrimitiveTable { &self.table }
//! #     fn strategy(&self) -> DispatchStrategy { DispatchStrategy::Indirect }
//! #     fn dispatch(&mut self, _state: MachineState) -> i32 { 0 }
//! # }
//! # fn interpreter() -> Interpreter { unimplemented!() }
//! std::process::exit(forthboot::cli::main(interpreter()));
//! ```
//!
//! The front end parses the options, locates and loads the image, pushes the start-up
//! environment block and runs the image. Errors are reported as a single line on stderr.

mod app;
mod environment;
mod search;

use std::ffi::OsString;

use anyhow::Context;
use clap::{error::ErrorKind, Parser};

pub use app::{Cli, DEFAULT_IMAGE};
pub use environment::Environment;
pub use search::{locate, search_path, DEFAULT_PATH, PATH_SEPARATOR, PATH_VARIABLE};

use crate::{
    config::Config,
    engine::{self, Engine},
    image::ImageLoader,
    Error,
};

/// Runs the command line of the current process on `engine`, returning the process exit code.
pub fn main<E: Engine>(engine: E) -> i32 {
    run(engine, std::env::args_os())
}

/// Runs the command line `args` (program name first) on `engine`.
///
/// Returns 0 after `--help` or `--version`, 1 for unusable options or an image that cannot be
/// loaded, `128 + signal` for a fatal fault in die-on-signal mode and the image's own exit code
/// otherwise.
pub fn run<E, I, T>(mut engine: E, args: I) -> i32
where
    E: Engine,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let program = args
        .first()
        .map_or_else(|| "forthboot".to_string(), |name| name.to_string_lossy().into_owned());

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(error) => {
            // Help and version text go to stdout, usage errors to stderr
            if let Err(print_error) = error.print() {
                log::debug!("cannot print usage: {print_error}");
            }
            return match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
        }
    };

    let config = match cli.config() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{program}: {error}");
            return error.exit_code();
        }
    };
    init_logging(&config);

    match execute(&mut engine, &cli, &config, &program) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{program}: {error:#}");
            error.downcast_ref::<Error>().map_or(1, Error::exit_code)
        }
    }
}

fn execute<E: Engine>(
    engine: &mut E,
    cli: &Cli,
    config: &Config,
    program: &str,
) -> anyhow::Result<i32> {
    let path = search_path(cli.path.as_deref());

    let location = locate(&cli.image_file, &path)?;
    let mut image = ImageLoader::new(config, &*engine)
        .load_file(&location)
        .with_context(|| format!("cannot load image {}", location.display()))?;

    let environment = Environment::new(program, &cli.arguments, &path)?;
    let code = engine::go(engine, &mut image, config, &environment.cells())?;
    Ok(code)
}

fn log_level(config: &Config) -> log::LevelFilter {
    if config.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

fn init_logging(config: &Config) {
    let initialised = env_logger::Builder::new()
        .filter_module("forthboot", log_level(config))
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .try_init();
    if initialised.is_err() {
        log::debug!("logger already initialised");
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use super::*;
    use crate::{
        engine::{CapturedFault, DispatchStrategy, FaultKind},
        file::io::WORD,
        image::ImageBuilder,
        test::MockEngine,
    };

    fn write_image(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("forthboot-cli-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let mut builder = ImageBuilder::new();
        let boot = builder.push_literal(0);
        builder.set_boot_entry(boot).set_throw_entry(boot);
        let image = dir.join("test.fi");
        fs::write(&image, builder.build()).unwrap();
        image
    }

    fn read(address: usize) -> usize {
        // SAFETY: tests only read addresses handed to the dispatcher
        unsafe { (address as *const usize).read_unaligned() }
    }

    #[test]
    fn help_and_version_exit_zero() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        assert_eq!(run(engine, ["forthboot", "--help"]), 0);
        let engine = MockEngine::new(DispatchStrategy::Direct);
        assert_eq!(run(engine, ["forthboot", "-v"]), 0);
    }

    #[test]
    fn missing_image_exits_one() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        let code = run(
            engine,
            ["forthboot", "-i", "missing.fi", "-p", "/nonexistent-forthboot-dir"],
        );
        assert_eq!(code, 1);
    }

    #[test]
    fn debug_flag_sets_log_level() {
        let cli = Cli::try_parse_from(["forthboot", "--debug"]).unwrap();
        assert_eq!(log_level(&cli.config().unwrap()), log::LevelFilter::Debug);

        let cli = Cli::try_parse_from(["forthboot"]).unwrap();
        assert_eq!(log_level(&cli.config().unwrap()), log::LevelFilter::Info);
        assert_eq!(
            log_level(&Config::new().with_debug(true)),
            log::LevelFilter::Debug
        );
    }

    #[test]
    fn bad_option_exits_one() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        assert_eq!(run(engine, ["forthboot", "-m", "3x"]), 1);
    }

    #[test]
    fn runs_image_with_environment() {
        let image = write_image("run");
        let engine = MockEngine::new(DispatchStrategy::Direct).on_dispatch(|state| {
            let argc = read(state.sp);
            let path_len = read(state.sp + 2 * WORD);
            (argc * 100 + path_len) as i32
        });

        let code = run(
            engine,
            [
                "forthboot",
                "-i",
                image.to_str().unwrap(),
                "-p",
                "/a:/b",
                "one",
                "two",
            ],
        );
        assert_eq!(code, 300 + 5);

        fs::remove_dir_all(image.parent().unwrap()).unwrap();
    }

    #[test]
    fn fatal_fault_exit_code() {
        let image = write_image("fatal");
        let engine = MockEngine::new(DispatchStrategy::Direct)
            .on_dispatch(|_| engine::raise_fault(CapturedFault::new(FaultKind::DivisionByZero)));

        let code = run(
            engine,
            ["forthboot", "--die-on-signal", "-i", image.to_str().unwrap()],
        );
        assert_eq!(code, FaultKind::DivisionByZero.signal().map_or(1, |signal| 128 + signal));

        fs::remove_dir_all(image.parent().unwrap()).unwrap();
    }
}
