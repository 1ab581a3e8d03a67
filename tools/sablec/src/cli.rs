use std::path::PathBuf;

use clap::Parser;

/// Compile a guest script into sable-js bytecode text.
#[derive(Parser, Debug)]
#[command(name = "sablec", version, about)]
pub struct Cli {
    /// Script to compile.
    pub file: Option<PathBuf>,

    /// Script to compile, when not given positionally.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Where to write the bytecode text.
    #[arg(short, long, value_name = "PATH", default_value = "./output")]
    pub output: PathBuf,

    /// Don't print [INFO]/[ERROR] lines.
    #[arg(short, long)]
    pub silent: bool,

    /// Log compiler internals to stderr (repeat for more detail).
    #[arg(long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// The positional path wins over `--input`.
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.file.as_ref().or(self.input.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_input_wins() {
        let cli = Cli::parse_from(["sablec", "-i", "flag.js", "pos.js"]);
        assert_eq!(cli.input_path(), Some(&PathBuf::from("pos.js")));
        assert_eq!(cli.output, PathBuf::from("./output"));
        assert!(!cli.silent);
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from(["sablec", "--input", "a.js", "-o", "out.txt", "-s", "--verbose", "--verbose"]);
        assert_eq!(cli.input_path(), Some(&PathBuf::from("a.js")));
        assert_eq!(cli.output, PathBuf::from("out.txt"));
        assert!(cli.silent);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn input_is_optional_at_parse_time() {
        let cli = Cli::parse_from(["sablec"]);
        assert_eq!(cli.input_path(), None);
    }
}
