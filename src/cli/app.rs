use std::mem::size_of;

use clap::{ArgAction, Parser};

use crate::{
    config::{Config, RegionSizes},
    file::io::WORD,
    utils::parse_size,
    Result,
};

/// Image file loaded when none is named.
pub const DEFAULT_IMAGE: &str = "forth.fi";

/// forthboot - load a Forth image and run it
#[derive(Debug, Parser)]
#[command(
    name = "forthboot",
    version,
    about,
    long_about = None,
    disable_version_flag = true,
    after_help = "SIZE arguments consist of an integer followed by a unit. The unit can be one of \
                  'b' (byte), 'e' (element; default), 'k' (KB), 'M' (MB), 'G' (GB) or 'T' (TB)."
)]
pub struct Cli {
    /// Use image FILE.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_IMAGE)]
    pub image_file: String,

    /// Specify dictionary size.
    #[arg(short = 'm', long, value_name = "SIZE")]
    pub dictionary_size: Option<String>,

    /// Specify data stack size.
    #[arg(short, long, value_name = "SIZE")]
    pub data_stack_size: Option<String>,

    /// Specify return stack size.
    #[arg(short, long, value_name = "SIZE")]
    pub return_stack_size: Option<String>,

    /// Specify floating point stack size.
    #[arg(short, long, value_name = "SIZE")]
    pub fp_stack_size: Option<String>,

    /// Specify locals stack size.
    #[arg(short, long, value_name = "SIZE")]
    pub locals_stack_size: Option<String>,

    /// Search path for finding image and sources.
    #[arg(short, long, value_name = "PATH")]
    pub path: Option<String>,

    /// Start the dictionary at a slightly offset address.
    #[arg(long, overrides_with = "no_offset_im")]
    pub offset_image: bool,

    /// Start the dictionary at the normal position.
    #[arg(long = "no-offset-im", overrides_with = "offset_image")]
    pub no_offset_im: bool,

    /// Initialize all of the dictionary with 0 before loading the image.
    #[arg(long)]
    pub clear_dictionary: bool,

    /// Exit instead of throwing some signals.
    #[arg(long)]
    pub die_on_signal: bool,

    /// Print debugging information during startup.
    #[arg(long)]
    pub debug: bool,

    /// Print version and exit.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    pub version: Option<bool>,

    /// Arguments passed on to the image.
    #[arg(
        value_name = "IMAGE-ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub arguments: Vec<String>,
}

impl Cli {
    /// Region size overrides given on the command line, 0 where absent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidSizeUnit`] or [`crate::Error::SizeTooLargeForPlatform`] for
    /// the first option that does not parse.
    pub fn sizes(&self) -> Result<RegionSizes> {
        let parse = |spec: &Option<String>, element: usize| -> Result<usize> {
            spec.as_deref()
                .map_or(Ok(0), |spec| parse_size(spec, element))
        };

        Ok(RegionSizes {
            dictionary: parse(&self.dictionary_size, WORD)?,
            data_stack: parse(&self.data_stack_size, WORD)?,
            fp_stack: parse(&self.fp_stack_size, size_of::<f64>())?,
            return_stack: parse(&self.return_stack_size, WORD)?,
            locals_stack: parse(&self.locals_stack_size, WORD)?,
        })
    }

    /// The runtime configuration selected by the options.
    ///
    /// # Errors
    ///
    /// See [`Cli::sizes`].
    pub fn config(&self) -> Result<Config> {
        Ok(Config::new()
            .with_sizes(self.sizes()?)
            .with_offset_image(self.offset_image && !self.no_offset_im)
            .with_clear_dictionary(self.clear_dictionary)
            .with_die_on_signal(self.die_on_signal)
            .with_debug(self.debug))
    }
}
