//! Fix-ups applied to transpiler output before compiling.
//!
//! The transpiler emits `Res0.c` with `#include "POUS.c"`, which compiles
//! the program bodies twice once the compiler picks up `POUS.c` on its own.
//! `POUS.c` in turn relies on declarations it never includes.

use std::path::Path;

use anyhow::Result;

use crate::util::fs;

const POUS_HEADER_INCLUDE: &str = "#include \"POUS.h\"";
const POUS_SOURCE_INCLUDE: &str = "#include \"POUS.c\"";

/// Prepend the header include and a blank line.
pub fn patch_pous(contents: &str) -> String {
    format!("{}\n\n{}", POUS_HEADER_INCLUDE, contents)
}

/// Replace every line including `POUS.c` with an include of `POUS.h`.
///
/// Line endings of untouched lines are preserved.
pub fn patch_resource(contents: &str) -> String {
    contents
        .split_inclusive('\n')
        .map(|line| {
            if line.contains(POUS_SOURCE_INCLUDE) {
                format!("{}\n", POUS_HEADER_INCLUDE)
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Apply both fix-ups to the files in `src_dir`.
pub fn patch_generated_sources(src_dir: &Path) -> Result<()> {
    rewrite(&src_dir.join("POUS.c"), patch_pous)?;
    rewrite(&src_dir.join("Res0.c"), patch_resource)
}

fn rewrite(path: &Path, patch: impl Fn(&str) -> String) -> Result<()> {
    let contents = fs::read_to_string(path)?;
    fs::write_string(path, &patch(&contents))
}
