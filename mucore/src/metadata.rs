//! Mutant metadata section codec.
//!
//! Layout of the `.mu_mutants` section:
//!
//! ```text
//! magic        8 bytes, "\0MUMETA\0"
//! version      varint
//! producer     length-prefixed semver string
//! record*      until the end of the section
//!   identifier length-prefixed string
//!   file       length-prefixed string
//!   line       varint
//!   column     varint
//!   mutator    length-prefixed mutator id
//! ```
//!
//! Records carry no resynchronization marker, decoding stops at the first one
//! that cannot be parsed.
use std::{path::Path, sync::Arc};

use semver::Version;

use crate::{
    encoding::{decode_str, decode_u64, encode_str, encode_u64},
    magic::{METADATA_FORMAT_VERSION, METADATA_MAGIC, MUTANTS_SECTION_NAME},
    mutant::{Mutant, MutationPoint, SourceLocation},
    mutators::{Mutator, MutatorsFactory},
    objfile::read_section,
    utils::error::MetadataError,
};

/// Version of the producing tool, recorded in every section.
pub fn producer_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// Serialize `mutants` in order into the section payload.
pub fn encode_mutants(mutants: &[Mutant]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + mutants.len() * 48);
    buf.extend_from_slice(&METADATA_MAGIC);
    encode_u64(METADATA_FORMAT_VERSION, &mut buf);
    encode_str(&producer_version().to_string(), &mut buf);

    for mutant in mutants {
        let location = mutant.source_location().cloned().unwrap_or_default();
        let mutator = mutant.mutator().map(|m| m.id()).unwrap_or_default();
        encode_str(mutant.identifier(), &mut buf);
        encode_str(&location.file, &mut buf);
        encode_u64(location.line as u64, &mut buf);
        encode_u64(location.column as u64, &mut buf);
        encode_str(mutator, &mut buf);
    }
    buf
}

/// Lazy reader over an encoded section.
pub struct MutantDeserializer<'a> {
    data: &'a [u8],
    records: usize,
    producer: Version,
    factory: &'a MutatorsFactory,
}

impl<'a> MutantDeserializer<'a> {
    /// Check the header. Records are only read when iterated.
    pub fn new(data: &'a [u8], factory: &'a MutatorsFactory) -> Result<Self, MetadataError> {
        let Some(mut rest) = data.strip_prefix(&METADATA_MAGIC[..]) else {
            return Err(MetadataError::BadMagic);
        };
        let offset = |rest: &[u8]| data.len() - rest.len();

        let version = decode_u64(&mut rest).ok_or_else(|| MetadataError::Malformed {
            offset: offset(rest),
            reason: "truncated format version".to_string(),
        })?;
        if version != METADATA_FORMAT_VERSION {
            return Err(MetadataError::UnsupportedVersion(version));
        }

        let producer = decode_str(&mut rest)
            .and_then(|s| Version::parse(s).ok())
            .ok_or_else(|| MetadataError::Malformed {
                offset: offset(rest),
                reason: "invalid producer version".to_string(),
            })?;

        Ok(Self {
            records: offset(rest),
            data,
            producer,
            factory,
        })
    }

    /// Version of the tool that wrote the section.
    pub fn producer(&self) -> &Version {
        &self.producer
    }

    /// Iterate over the records from the first one. Every call starts over.
    pub fn iter(&self) -> MutantIter<'_> {
        MutantIter {
            data: self.data,
            cursor: &self.data[self.records..],
            factory: self.factory,
            failed: false,
        }
    }
}

/// Iterator over the records of a section, fused after the first error.
pub struct MutantIter<'a> {
    data: &'a [u8],
    cursor: &'a [u8],
    factory: &'a MutatorsFactory,
    failed: bool,
}

impl MutantIter<'_> {
    fn malformed(&self, reason: impl Into<String>) -> MetadataError {
        MetadataError::Malformed {
            offset: self.data.len() - self.cursor.len(),
            reason: reason.into(),
        }
    }

    fn field<T>(
        &mut self,
        name: &str,
        decode: impl FnOnce(&mut &[u8]) -> Option<T>,
    ) -> Result<T, MetadataError> {
        let mut cursor = self.cursor;
        let value = decode(&mut cursor).ok_or_else(|| self.malformed(format!("bad {}", name)))?;
        self.cursor = cursor;
        Ok(value)
    }

    fn record(&mut self) -> Result<Mutant, MetadataError> {
        let start = self.cursor;
        let result = self.parse_record();
        if result.is_err() {
            // Report the offset of the record, not of the failing field.
            self.cursor = start;
        }
        result.map_err(|e| match e {
            MetadataError::Malformed { reason, .. } => self.malformed(reason),
            e => e,
        })
    }

    fn parse_record(&mut self) -> Result<Mutant, MetadataError> {
        let identifier = self.field("identifier", |c| decode_str(c).map(str::to_string))?;
        let file = self.field("file", |c| decode_str(c).map(str::to_string))?;
        let line = self.field("line", |c| decode_u64(c).and_then(|v| u32::try_from(v).ok()))?;
        let column = self.field("column", |c| decode_u64(c).and_then(|v| u32::try_from(v).ok()))?;
        let id = self.field("mutator id", |c| decode_str(c).map(str::to_string))?;
        let mutator: Arc<dyn Mutator> = self
            .factory
            .lookup(&id)
            .ok_or_else(|| self.malformed(format!("unknown mutator '{}'", id)))?;

        let point = MutationPoint::detached(
            mutator,
            SourceLocation::new(file, line, column),
            identifier.clone(),
        );
        Ok(Mutant::new(identifier, vec![point]))
    }
}

impl Iterator for MutantIter<'_> {
    type Item = Result<Mutant, MetadataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_empty() {
            return None;
        }
        let result = self.record();
        self.failed = result.is_err();
        Some(result)
    }
}

impl std::iter::FusedIterator for MutantIter<'_> {}

/// Payload of the metadata section of a binary. An empty section counts as
/// absent.
pub fn section_from_binary(bytes: &[u8]) -> Result<Vec<u8>, MetadataError> {
    match read_section(bytes, &[MUTANTS_SECTION_NAME])? {
        Some(data) if !data.is_empty() => Ok(data),
        _ => Err(MetadataError::SectionNotFound {
            section: MUTANTS_SECTION_NAME.to_string(),
        }),
    }
}

/// Outcome of decoding a whole section.
#[derive(Debug)]
pub struct DecodedMutants {
    pub producer: Version,
    /// Records decoded before the first error, in section order.
    pub mutants: Vec<Mutant>,
    /// Error that stopped decoding, if any.
    pub error: Option<MetadataError>,
}

/// Decode every record of `bytes`, keeping those before the first malformed
/// one.
pub fn decode_all(bytes: &[u8], factory: &MutatorsFactory) -> Result<DecodedMutants, MetadataError> {
    let deserializer = MutantDeserializer::new(bytes, factory)?;
    let mut mutants = Vec::new();
    let mut error = None;
    for record in deserializer.iter() {
        match record {
            Ok(mutant) => mutants.push(mutant),
            Err(e) => error = Some(e),
        }
    }
    Ok(DecodedMutants {
        producer: deserializer.producer().clone(),
        mutants,
        error,
    })
}

/// Read the mutants embedded in the binary at `path`.
pub fn read_mutants_from_binary(
    path: &Path,
    factory: &MutatorsFactory,
) -> Result<DecodedMutants, MetadataError> {
    let bytes = std::fs::read(path)?;
    let section = section_from_binary(&bytes)?;
    decode_all(&section, factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mutators::MutatorKind,
        objfile::{ObjectTarget, write_sections},
    };

    fn mutants(count: usize) -> Vec<Mutant> {
        let factory = MutatorsFactory::default();
        let kinds = [
            MutatorKind::CxxAddToSub,
            MutatorKind::CxxLtToGe,
            MutatorKind::CxxXorToOr,
        ];
        (0..count)
            .map(|i| {
                let kind = kinds[i % kinds.len()];
                let location = SourceLocation::new(format!("src/f{}.c", i % 7), i as u32 + 1, 3);
                let identifier = MutationPoint::make_identifier(kind, &location);
                let mutator = factory.lookup(kind.id()).unwrap();
                Mutant::new(
                    identifier.clone(),
                    vec![MutationPoint::detached(mutator, location, identifier)],
                )
            })
            .collect()
    }

    fn shape(mutants: &[Mutant]) -> Vec<(String, SourceLocation, &'static str)> {
        mutants
            .iter()
            .map(|m| {
                (
                    m.identifier().to_string(),
                    m.source_location().cloned().unwrap(),
                    m.mutator().unwrap().id(),
                )
            })
            .collect()
    }

    #[test]
    fn round_trip() {
        let factory = MutatorsFactory::default();
        for count in [0, 1, 1000] {
            let original = mutants(count);
            let bytes = encode_mutants(&original);
            let decoded = decode_all(&bytes, &factory).unwrap();
            assert!(decoded.error.is_none());
            assert_eq!(decoded.producer, producer_version());
            assert_eq!(shape(&decoded.mutants), shape(&original));
        }
    }

    #[test]
    fn iteration_restarts() {
        let factory = MutatorsFactory::default();
        let bytes = encode_mutants(&mutants(3));
        let deserializer = MutantDeserializer::new(&bytes, &factory).unwrap();
        assert_eq!(deserializer.iter().count(), 3);
        let first = deserializer.iter().next().unwrap().unwrap();
        assert_eq!(first.identifier(), "cxx_add_to_sub:src/f0.c:1:3");
    }

    #[test]
    fn truncated_stream_keeps_leading_records() {
        let factory = MutatorsFactory::default();
        let bytes = encode_mutants(&mutants(5));
        let cut = &bytes[..bytes.len() - 4];

        let decoded = decode_all(cut, &factory).unwrap();
        assert_eq!(decoded.mutants.len(), 4);
        assert!(matches!(
            decoded.error,
            Some(MetadataError::Malformed { .. })
        ));

        let deserializer = MutantDeserializer::new(cut, &factory).unwrap();
        let mut iter = deserializer.iter();
        assert_eq!(iter.by_ref().filter(Result::is_ok).count(), 4);
        assert!(iter.next().is_none());
    }

    #[test]
    fn unknown_mutator_is_malformed() {
        let mut bytes = encode_mutants(&[]);
        encode_str("x:a.c:1:1", &mut bytes);
        encode_str("a.c", &mut bytes);
        encode_u64(1, &mut bytes);
        encode_u64(1, &mut bytes);
        encode_str("cxx_teleport", &mut bytes);

        let decoded = decode_all(&bytes, &MutatorsFactory::default()).unwrap();
        assert!(decoded.mutants.is_empty());
        let Some(MetadataError::Malformed { offset, reason }) = decoded.error else {
            panic!("expected malformed metadata");
        };
        assert_eq!(offset, encode_mutants(&[]).len());
        assert!(reason.contains("cxx_teleport"));
    }

    #[test]
    fn bad_headers() {
        let factory = MutatorsFactory::default();
        assert!(
            MutantDeserializer::new(b"garbage", &factory)
                .err()
                .is_some_and(|e| e.is_bad_magic())
        );

        let mut bytes = METADATA_MAGIC.to_vec();
        encode_u64(99, &mut bytes);
        assert!(matches!(
            MutantDeserializer::new(&bytes, &factory).err(),
            Some(MetadataError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn binaries_without_section() {
        let object = write_sections(ObjectTarget::default(), &[(".data", b"abc")]).unwrap();
        assert!(
            section_from_binary(&object)
                .unwrap_err()
                .is_section_not_found()
        );

        let empty = write_sections(ObjectTarget::default(), &[(MUTANTS_SECTION_NAME, b"")]).unwrap();
        assert!(
            section_from_binary(&empty)
                .unwrap_err()
                .is_section_not_found()
        );

        let payload = encode_mutants(&mutants(2));
        let object =
            write_sections(ObjectTarget::default(), &[(MUTANTS_SECTION_NAME, &payload)]).unwrap();
        assert_eq!(section_from_binary(&object).unwrap(), payload);
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app");
        let payload = encode_mutants(&mutants(2));
        let object =
            write_sections(ObjectTarget::default(), &[(MUTANTS_SECTION_NAME, &payload)]).unwrap();
        std::fs::write(&path, object).unwrap();

        let decoded = read_mutants_from_binary(&path, &MutatorsFactory::default()).unwrap();
        assert_eq!(decoded.mutants.len(), 2);

        let missing = read_mutants_from_binary(&dir.path().join("nope"), &MutatorsFactory::default());
        assert!(missing.unwrap_err().is_io_error());
    }
}
