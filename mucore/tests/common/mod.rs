#![allow(dead_code)]

use std::path::{Path, PathBuf};

use mucore::{
    magic::{BUILTIN_LINKER, IR_SECTION_NAME},
    objfile::{ObjectTarget, write_sections},
    utils::conf::Configuration,
};

pub const CLAMP: &str = r#"
module "src/a.c"
define i32 @clamp(%x: i32) !loc("src/a.c", 1, 1) {
entry:
    %small = icmp.slt i32 %x, i32 10 !loc(2, 11)
    branch %small, label low, label high
low:
    %y = add i32 %x, i32 1 !loc(3, 14)
    ret %y
high:
    ret i32 10
}
"#;

pub const RUN: &str = r#"
module "src/b.c"
declare i32 @clamp(%x: i32)
define i32 @run(%n: i32) !loc("src/b.c", 1, 1) {
entry:
    %c = call i32 @clamp(%n)
    %d = mul i32 %c, i32 2 !loc(3, 12)
    %z = icmp.eq i32 %d, i32 0 !loc(4, 9)
    branch %z, label zero, label nonzero
zero:
    ret i32 99
nonzero:
    ret %d
}
"#;

/// Write an object file embedding `ir` in its IR section.
pub fn write_object(dir: &Path, name: &str, ir: &str) -> PathBuf {
    let path = dir.join(name);
    let bytes = write_sections(ObjectTarget::default(), &[(IR_SECTION_NAME, ir.as_bytes())])
        .expect("object should be written");
    std::fs::write(&path, bytes).expect("object should be saved");
    path
}

/// Write an object file without embedded IR.
pub fn write_plain_object(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let bytes = write_sections(ObjectTarget::default(), &[(".data", b"\x01\x02".as_slice())])
        .expect("object should be written");
    std::fs::write(&path, bytes).expect("object should be saved");
    path
}

/// Configuration linking with the built-in image toolchain inside `dir`.
pub fn image_config(dir: &Path) -> Configuration {
    Configuration {
        workers: 2,
        linker: BUILTIN_LINKER.to_string(),
        work_dir: Some(dir.join("work")),
        output: dir.join("app.img"),
        ..Default::default()
    }
}
