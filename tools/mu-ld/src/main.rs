use std::path::PathBuf;

use clap::{ArgAction, Parser as ClapParser};
use mucore::{
    ext::diag::Diagnostics,
    invocation::LinkerInvocation,
    magic::{BUILTIN_LINKER, ENV_LD_ARGS, ENV_LINKER},
    muerror,
    toolchain::{ExternalToolchain, ImageToolchain, Toolchain},
    utils::{
        conf::Configuration,
        error::{MuError, MuResult},
    },
};

/// Link object files, injecting every mutant found in their embedded IR.
///
/// Arguments that are not options of mu-ld are forwarded to the real linker,
/// except object files (`*.o`) which are mutated and `-o <path>` which names
/// the output. `-h` and `-V` belong to the real linker.
#[derive(ClapParser)]
#[command(
    name = "mu-ld",
    version,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Arguments {
    /// Print help
    #[arg(long = "mu-help", action = ArgAction::Help)]
    help: Option<bool>,

    /// Print version
    #[arg(long = "mu-version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Path of the real linker (defaults to $MU_LD_LINKER)
    #[arg(long = "mu-linker")]
    linker: Option<String>,

    /// Configuration file (defaults to $MU_CONFIG_PATH)
    #[arg(long = "mu-config")]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long = "mu-workers")]
    workers: Option<usize>,

    /// Write the text of every mutated module into this directory
    #[arg(long = "mu-dump-ir")]
    dump_ir: Option<PathBuf>,

    /// Print debug diagnostics
    #[arg(long = "mu-debug")]
    debug: bool,

    /// Object files and linker arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

/// Object files, forwarded flags and output of a linker command line.
#[derive(Debug, Default, PartialEq, Eq)]
struct LinkLine {
    objects: Vec<PathBuf>,
    flags: Vec<String>,
    output: Option<PathBuf>,
}

fn split_link_line(args: &[String]) -> LinkLine {
    let mut line = LinkLine::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-o" {
            line.output = iter.next().map(PathBuf::from);
        } else if let Some(path) = arg.strip_prefix("-o").filter(|p| !p.is_empty()) {
            line.output = Some(PathBuf::from(path));
        } else if !arg.starts_with('-') && arg.ends_with(".o") {
            line.objects.push(PathBuf::from(arg));
        } else {
            line.flags.push(arg.clone());
        }
    }
    line
}

/// Command line with the arguments of [`ENV_LD_ARGS`] inserted first.
fn command_line() -> Vec<String> {
    let mut argv: Vec<String> = std::env::args().collect();
    if let Ok(extra) = std::env::var(ENV_LD_ARGS) {
        let at = 1.min(argv.len());
        argv.splice(at..at, extra.split_whitespace().map(str::to_string));
    }
    argv
}

fn configure(args: &Arguments, line: &LinkLine) -> MuResult<Configuration> {
    let path = args.config.clone().or_else(Configuration::default_path);
    let mut config = match path {
        Some(path) => Configuration::load_from_toml(&path)?,
        None => Configuration::default(),
    };

    if let Some(linker) = args.linker.clone().or_else(|| std::env::var(ENV_LINKER).ok()) {
        config.linker = linker;
    }
    if config.linker.is_empty() {
        return Err(MuError::InvalidConfiguration(format!(
            "no linker given, use --mu-linker or set {}",
            ENV_LINKER
        )));
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(dir) = &args.dump_ir {
        config.dump_ir = Some(dir.clone());
    }
    if let Some(output) = &line.output {
        config.output = output.clone();
    }
    config.debug |= args.debug;
    config.linker_flags.extend(line.flags.iter().cloned());
    Ok(config)
}

fn main() {
    let args = Arguments::parse_from(command_line());
    let line = split_link_line(&args.rest);
    let diag = Diagnostics::new(args.debug);

    let config = match configure(&args, &line) {
        Ok(config) => config,
        Err(e) => {
            muerror!(diag, "{}", e);
            std::process::exit(1);
        }
    };
    diag.set_debug(config.debug);

    for object in &line.objects {
        if let Err(e) = std::fs::metadata(object) {
            muerror!(diag, "Cannot read input '{}': {}", object.display(), e);
            std::process::exit(1);
        }
    }

    let external;
    let toolchain: &dyn Toolchain = if config.linker == BUILTIN_LINKER {
        &ImageToolchain
    } else {
        external = ExternalToolchain::new(&config);
        &external
    };

    match LinkerInvocation::new(line.objects, &config, &diag, toolchain).run() {
        Ok(summary) => {
            println!("{}", summary);
            for path in &summary.skipped {
                println!("skipped: {}", path.display());
            }
        }
        Err(_) => std::process::exit(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn link_line_is_split() {
        let line = split_link_line(&strings(&[
            "-L/usr/lib",
            "main.o",
            "-lm",
            "-o",
            "app",
            "util.o",
            "libfoo.a",
        ]));
        assert_eq!(
            line.objects,
            vec![PathBuf::from("main.o"), PathBuf::from("util.o")]
        );
        assert_eq!(line.flags, strings(&["-L/usr/lib", "-lm", "libfoo.a"]));
        assert_eq!(line.output, Some(PathBuf::from("app")));

        let joined = split_link_line(&strings(&["-oapp", "a.o"]));
        assert_eq!(joined.output, Some(PathBuf::from("app")));
    }

    #[test]
    fn options_and_linker_arguments() {
        let args = Arguments::parse_from(strings(&[
            "mu-ld",
            "--mu-linker",
            "cc",
            "--mu-workers",
            "3",
            "-lm",
            "a.o",
            "-o",
            "out",
        ]));
        assert_eq!(args.linker.as_deref(), Some("cc"));
        assert_eq!(args.workers, Some(3));
        assert_eq!(args.rest, strings(&["-lm", "a.o", "-o", "out"]));

        let line = split_link_line(&args.rest);
        let config = configure(&args, &line).unwrap();
        assert_eq!(config.linker, "cc");
        assert_eq!(config.workers, 3);
        assert_eq!(config.output, PathBuf::from("out"));
        assert_eq!(config.linker_flags, strings(&["-lm"]));
    }

    #[test]
    fn linker_short_flags_are_forwarded() {
        let args = Arguments::parse_from(strings(&[
            "mu-ld",
            "-h",
            "libfoo.so.1",
            "-V",
            "main.o",
        ]));
        assert_eq!(args.rest, strings(&["-h", "libfoo.so.1", "-V", "main.o"]));

        let line = split_link_line(&args.rest);
        assert_eq!(line.objects, vec![PathBuf::from("main.o")]);
        assert_eq!(line.flags, strings(&["-h", "libfoo.so.1", "-V"]));

        let help = Arguments::try_parse_from(strings(&["mu-ld", "--mu-help"])).err();
        assert_eq!(
            help.map(|e| e.kind()),
            Some(clap::error::ErrorKind::DisplayHelp)
        );
    }
}
