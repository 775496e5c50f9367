use std::path::PathBuf;

use clap::Parser as ClapParser;
use mucore::{
    ext::diag::Diagnostics,
    metadata::{DecodedMutants, read_mutants_from_binary},
    muerror,
    mutant::Mutant,
    mutators::MutatorsFactory,
    runtime::{Image, Machine},
    utils::error::MetadataError,
};

/// Print the mutants embedded in a linked artifact.
#[derive(ClapParser)]
#[command(name = "mu-dump-mutants", version)]
pub struct Arguments {
    /// Path to the linked artifact
    input: PathBuf,

    /// Run this function of an image after listing the mutants
    #[arg(long)]
    exec: Option<String>,

    /// Argument passed to the executed function, repeatable
    #[arg(long = "arg")]
    args: Vec<u64>,

    /// Mutant to activate, repeatable, added to $MU_ACTIVE_MUTANTS
    #[arg(long)]
    active: Vec<String>,
}

fn describe(mutant: &Mutant) -> String {
    let (id, description, replacement) = mutant
        .mutator()
        .map(|m| (m.id(), m.description(), m.replacement()))
        .unwrap_or(("?", "", ""));
    let location = mutant
        .source_location()
        .map(|l| l.to_string())
        .unwrap_or_default();
    format!(
        "{}  {}  {}  {} ({})",
        mutant.identifier(),
        id,
        location,
        description,
        replacement
    )
}

fn dump(decoded: &DecodedMutants, diag: &Diagnostics) -> bool {
    if decoded.mutants.is_empty() && decoded.error.is_none() {
        println!("no mutant info found");
        return true;
    }
    for mutant in &decoded.mutants {
        println!("{}", describe(mutant));
    }
    match &decoded.error {
        Some(e) => {
            muerror!(diag, "{}", e);
            false
        }
        None => true,
    }
}

fn main() {
    let args = Arguments::parse();
    let factory = MutatorsFactory::default();
    let diag = Diagnostics::default();

    match read_mutants_from_binary(&args.input, &factory) {
        Ok(decoded) => {
            if !dump(&decoded, &diag) {
                std::process::exit(1);
            }
        }
        Err(MetadataError::SectionNotFound { .. }) => println!("no mutant info found"),
        Err(e) => {
            muerror!(diag, "Cannot read mutants of {}: {}", args.input.display(), e);
            std::process::exit(1);
        }
    }

    if let Some(function) = &args.exec {
        let image = match Image::load(&args.input) {
            Ok(image) => image,
            Err(e) => {
                muerror!(diag, "{}", e);
                std::process::exit(1);
            }
        };
        let mut machine = Machine::new(&image)
            .with_active_from_env()
            .with_active(args.active.iter().cloned());
        match machine.call(function, &args.args) {
            Ok(Some(value)) => println!("{} returned {}", function, value),
            Ok(None) => println!("{} returned", function),
            Err(e) => {
                muerror!(diag, "{}", e);
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mucore::mutant::{MutationPoint, SourceLocation};

    use super::*;

    #[test]
    fn line_format() {
        let factory = MutatorsFactory::default();
        let mutator = factory.lookup("cxx_eq_to_ne").unwrap();
        let location = SourceLocation::new("src/b.c", 4, 9);
        let point = MutationPoint::detached(mutator, location, "cxx_eq_to_ne:src/b.c:4:9");
        let mutant = Mutant::new("cxx_eq_to_ne:src/b.c:4:9", vec![point]);
        assert_eq!(
            describe(&mutant),
            "cxx_eq_to_ne:src/b.c:4:9  cxx_eq_to_ne  src/b.c:4:9  Replaces == with != (!=)"
        );
    }

    #[test]
    fn malformed_metadata_reaches_the_diagnostics() {
        use std::sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        };

        let reported = Arc::new(AtomicUsize::new(0));
        let sink = reported.clone();
        let diag = Diagnostics::with_callback(
            false,
            Box::new(move |_, _| {
                sink.fetch_add(1, Ordering::Relaxed);
            }),
        );

        let clean = DecodedMutants {
            producer: mucore::metadata::producer_version(),
            mutants: Vec::new(),
            error: None,
        };
        assert!(dump(&clean, &diag));
        assert_eq!(diag.errors(), 0);

        let broken = DecodedMutants {
            error: Some(MetadataError::Malformed {
                offset: 12,
                reason: "bad file".to_string(),
            }),
            ..clean
        };
        assert!(!dump(&broken, &diag));
        assert_eq!(diag.errors(), 1);
        assert_eq!(reported.load(Ordering::Relaxed), 1);
    }
}
