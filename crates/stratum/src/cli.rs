//! Command line parsing. Simple flag walking, no external deps.

use thiserror::Error;

/// Ways the command line can be unusable.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CliError {
    /// `-h` was given.
    #[error("help requested")]
    HelpRequested,

    /// `-m` is mandatory.
    #[error("module path (-m) is empty")]
    MissingModulePath,

    /// A flag was given without its value.
    #[error("flag {0} needs a value")]
    MissingValue(String),

    /// An unrecognized flag was given.
    #[error("invalid command-line argument {0}")]
    UnknownFlag(String),
}

/// Parsed command line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    /// Module/data directory (`-m`, required).
    pub module_path: String,
    /// Build output path (`-r`).
    pub build_path: Option<String>,
    /// Interface headers path (`-i`).
    pub interface_path: Option<String>,
    /// Shared data path (`-S`).
    pub share_path: Option<String>,
}

impl CliOptions {
    /// Parses the argument list (without the program name).
    ///
    /// # Errors
    ///
    /// [`CliError`] for `-h`, a missing `-m`, a flag without a value, or
    /// an unknown flag.
    pub fn parse(args: &[String]) -> Result<Self, CliError> {
        let mut options = Self::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "-h" => return Err(CliError::HelpRequested),
                "-m" | "-r" | "-i" | "-S" => {
                    let value = args
                        .get(i + 1)
                        .ok_or_else(|| CliError::MissingValue(flag.to_owned()))?
                        .clone();
                    match flag {
                        "-m" => options.module_path = value,
                        "-r" => options.build_path = Some(value),
                        "-i" => options.interface_path = Some(value),
                        _ => options.share_path = Some(value),
                    }
                    i += 2;
                }
                other => return Err(CliError::UnknownFlag(other.to_owned())),
            }
        }
        if options.module_path.is_empty() {
            return Err(CliError::MissingModulePath);
        }
        Ok(options)
    }
}

/// Prints the usage text to stderr.
pub fn print_usage() {
    eprintln!(
        "Usage: stratum_server [OPTION]...\n\
         \x20 -h                   Show this help\n\
         \x20 -m [module_path]     Specify module path\n\
         \x20 -r [build_path]      Specify build path\n\
         \x20 -i [interface_path]  Specify path to interface definitions\n\
         \x20 -S [share_path]      Specify path to share/"
    );
}
