//! Reading and writing custom sections of object files.
use object::{Architecture, BinaryFormat, Endianness, Object, ObjectSection, SectionKind, write};

/// Target description of an object file written by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectTarget {
    pub format: BinaryFormat,
    pub architecture: Architecture,
    pub endianness: Endianness,
}

impl Default for ObjectTarget {
    fn default() -> Self {
        Self {
            format: BinaryFormat::Elf,
            architecture: Architecture::X86_64,
            endianness: Endianness::Little,
        }
    }
}

impl ObjectTarget {
    /// Target of an existing object file.
    pub fn of(data: &[u8]) -> Result<Self, object::Error> {
        let file = object::File::parse(data)?;
        Ok(Self {
            format: file.format(),
            architecture: file.architecture(),
            endianness: file.endianness(),
        })
    }
}

/// Write a data-only object file holding the given named sections.
pub fn write_sections(
    target: ObjectTarget,
    sections: &[(&str, &[u8])],
) -> Result<Vec<u8>, write::Error> {
    let mut obj = write::Object::new(target.format, target.architecture, target.endianness);
    for (name, data) in sections {
        let segment = obj.segment_name(write::StandardSegment::Data).to_vec();
        let id = obj.add_section(segment, name.as_bytes().to_vec(), SectionKind::ReadOnlyData);
        obj.append_section_data(id, data, 1);
    }
    obj.write()
}

/// Contents of the first section whose name is one of `names`.
///
/// Returns `Ok(None)` when the object is valid but carries none of them.
pub fn read_section(data: &[u8], names: &[&str]) -> Result<Option<Vec<u8>>, object::Error> {
    let file = object::File::parse(data)?;
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            return Ok(Some(section.data()?.to_vec()));
        }
    }
    Ok(None)
}
