//! Located variable parsing and glue code generation.
//!
//! The transpiler writes one `__LOCATED_VAR(...)` line per variable bound to
//! an I/O address, for example:
//!
//! ```text
//! __LOCATED_VAR(BOOL,__QX0_1,Q,X,0,1)
//! __LOCATED_VAR(INT,__IW3,I,W,3)
//! ```
//!
//! Each variable is mapped to a slot in one of the runtime's pointer buffers
//! and the assignments are emitted as the body of `glueVars()`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Marker that identifies a located variable line.
pub const LOCATED_VAR_MARKER: &str = "__LOCATED_VAR(";

/// Failure to turn located variables into glue code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlueError {
    #[error("malformed located variable line: {line}")]
    Malformed { line: String },

    #[error("could not process location \"{name}\" from line: {line}")]
    Unsupported { name: String, line: String },

    #[error("wrong location for var {name}: {class} address {address}.{subaddress} exceeds {limit}")]
    OutOfRange {
        name: String,
        class: LocationClass,
        address: u32,
        subaddress: u32,
        limit: String,
    },
}

/// Memory area and access width of a located variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationClass {
    /// `%QX`: output bit
    OutputBit,
    /// `%IX`: input bit
    InputBit,
    /// `%QW`: output word
    OutputWord,
    /// `%IW`: input word
    InputWord,
    /// `%MW`: memory word
    MemoryWord,
    /// `%MD`: memory double word
    MemoryDword,
    /// `%ML`: memory long word
    MemoryLword,
}

impl LocationClass {
    /// Decode the area (`I`, `Q`, `M`) and size (`X`, `W`, `D`, `L`) fields.
    pub fn from_parts(area: &str, size: &str) -> Option<Self> {
        match (area, size) {
            ("Q", "X") => Some(LocationClass::OutputBit),
            ("I", "X") => Some(LocationClass::InputBit),
            ("Q", "W") => Some(LocationClass::OutputWord),
            ("I", "W") => Some(LocationClass::InputWord),
            ("M", "W") => Some(LocationClass::MemoryWord),
            ("M", "D") => Some(LocationClass::MemoryDword),
            ("M", "L") => Some(LocationClass::MemoryLword),
            _ => None,
        }
    }

    /// Two-letter IEC notation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationClass::OutputBit => "QX",
            LocationClass::InputBit => "IX",
            LocationClass::OutputWord => "QW",
            LocationClass::InputWord => "IW",
            LocationClass::MemoryWord => "MW",
            LocationClass::MemoryDword => "MD",
            LocationClass::MemoryLword => "ML",
        }
    }

    /// Runtime buffer the variable is assigned into.
    pub fn buffer(&self) -> &'static str {
        match self {
            LocationClass::OutputBit => "bool_output",
            LocationClass::InputBit => "bool_input",
            LocationClass::OutputWord => "int_output",
            LocationClass::InputWord => "int_input",
            LocationClass::MemoryWord => "int_memory",
            LocationClass::MemoryDword => "dint_memory",
            LocationClass::MemoryLword => "lint_memory",
        }
    }

    /// Whether the buffer is indexed by address and sub-address.
    pub fn is_bit(&self) -> bool {
        matches!(self, LocationClass::OutputBit | LocationClass::InputBit)
    }

    /// Highest accepted address.
    pub fn max_address(&self) -> u32 {
        match self {
            LocationClass::OutputBit | LocationClass::InputBit => 6,
            LocationClass::OutputWord | LocationClass::InputWord => 32,
            LocationClass::MemoryWord | LocationClass::MemoryDword | LocationClass::MemoryLword => {
                20
            }
        }
    }

    /// Highest accepted sub-address.
    pub fn max_subaddress(&self) -> Option<u32> {
        if self.is_bit() {
            Some(7)
        } else {
            None
        }
    }
}

impl fmt::Display for LocationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One variable declared in `LOCATED_VARIABLES.h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedVar {
    pub ty: String,
    pub name: String,
    pub location: LocationClass,
    pub address: u32,
    pub subaddress: u32,
}

impl LocatedVar {
    /// Parse a line containing a `__LOCATED_VAR(...)` invocation.
    ///
    /// The class is decoded from the area and size fields. Missing
    /// sub-addresses default to 0. The address limits of the class are not
    /// checked here; see [`LocatedVar::check_range`].
    pub fn parse(line: &str) -> Result<Self, GlueError> {
        let malformed = || GlueError::Malformed {
            line: line.trim().to_string(),
        };

        let start = line.find(LOCATED_VAR_MARKER).ok_or_else(malformed)? + LOCATED_VAR_MARKER.len();
        let rest = &line[start..];
        let end = rest.find(')').ok_or_else(malformed)?;
        let fields: Vec<&str> = rest[..end].split(',').map(str::trim).collect();
        if fields.len() < 5 {
            return Err(malformed());
        }

        let ty = fields[0];
        let name = fields[1];
        if ty.is_empty() || name.is_empty() {
            return Err(malformed());
        }

        let location =
            LocationClass::from_parts(fields[2], fields[3]).ok_or_else(|| GlueError::Unsupported {
                name: name.to_string(),
                line: line.trim().to_string(),
            })?;

        let address = fields[4].parse::<u32>().map_err(|_| malformed())?;
        let subaddress = match fields.get(5) {
            Some(sub) => sub.parse::<u32>().map_err(|_| malformed())?,
            None => 0,
        };

        Ok(LocatedVar {
            ty: ty.to_string(),
            name: name.to_string(),
            location,
            address,
            subaddress,
        })
    }

    /// Reject addresses beyond the buffer sizes of the runtime.
    pub fn check_range(&self) -> Result<(), GlueError> {
        let class = self.location;
        let address_ok = self.address <= class.max_address();
        let sub_ok = class
            .max_subaddress()
            .map_or(true, |max| self.subaddress <= max);

        if address_ok && sub_ok {
            return Ok(());
        }

        let limit = match class.max_subaddress() {
            Some(max_sub) => format!("{}.{}", class.max_address(), max_sub),
            None => class.max_address().to_string(),
        };
        Err(GlueError::OutOfRange {
            name: self.name.clone(),
            class,
            address: self.address,
            subaddress: self.subaddress,
            limit,
        })
    }

    /// The `glueVars()` statement for this variable.
    pub fn assignment(&self) -> String {
        if self.location.is_bit() {
            format!(
                "    {}[{}][{}] = {};",
                self.location.buffer(),
                self.address,
                self.subaddress,
                self.name
            )
        } else {
            format!(
                "    {}[{}] = {};",
                self.location.buffer(),
                self.address,
                self.name
            )
        }
    }
}

impl FromStr for LocatedVar {
    type Err = GlueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocatedVar::parse(s)
    }
}

/// Parse every located variable line in a header, checking address limits.
///
/// Lines without the marker are ignored. The first bad line aborts.
pub fn parse_located_variables(contents: &str) -> Result<Vec<LocatedVar>, GlueError> {
    contents
        .lines()
        .filter(|line| line.contains(LOCATED_VAR_MARKER))
        .map(|line| {
            let var = LocatedVar::parse(line)?;
            var.check_range()?;
            Ok(var)
        })
        .collect()
}

const PRELUDE: &str = r#"
#include "iec_std_lib.h"

#define __LOCATED_VAR(type, name, ...) type __##name;
#include "LOCATED_VARIABLES.h"
#undef __LOCATED_VAR
#define __LOCATED_VAR(type, name, ...) type* name = &__##name;
#include "LOCATED_VARIABLES.h"
#undef __LOCATED_VAR

TIME __CURRENT_TIME;
BOOL __DEBUG;
extern unsigned long long common_ticktime__;

//OpenPLC Buffers
#if defined(__AVR_ATmega328P__) || defined(__AVR_ATmega168__) || defined(__AVR_ATmega32U4__) || defined(__AVR_ATmega16U4__)

#define MAX_DIGITAL_INPUT          8
#define MAX_DIGITAL_OUTPUT         32
#define MAX_ANALOG_INPUT           6
#define MAX_ANALOG_OUTPUT          32
#define MAX_MEMORY_WORD            0
#define MAX_MEMORY_DWORD           0
#define MAX_MEMORY_LWORD           0

IEC_BOOL *bool_input[MAX_DIGITAL_INPUT/8][8];
IEC_BOOL *bool_output[MAX_DIGITAL_OUTPUT/8][8];
IEC_UINT *int_input[MAX_ANALOG_INPUT];
IEC_UINT *int_output[MAX_ANALOG_OUTPUT];

#else

#define MAX_DIGITAL_INPUT          56
#define MAX_DIGITAL_OUTPUT         56
#define MAX_ANALOG_INPUT           32
#define MAX_ANALOG_OUTPUT          32
#define MAX_MEMORY_WORD            20
#define MAX_MEMORY_DWORD           20
#define MAX_MEMORY_LWORD           20

IEC_BOOL *bool_input[MAX_DIGITAL_INPUT/8][8];
IEC_BOOL *bool_output[MAX_DIGITAL_OUTPUT/8][8];
IEC_UINT *int_input[MAX_ANALOG_INPUT];
IEC_UINT *int_output[MAX_ANALOG_OUTPUT];
IEC_UINT *int_memory[MAX_MEMORY_WORD];
IEC_UDINT *dint_memory[MAX_MEMORY_DWORD];
IEC_ULINT *lint_memory[MAX_MEMORY_LWORD];

#endif


void glueVars()
{
"#;

const EPILOGUE: &str = r#"}

void updateTime()
{
    __CURRENT_TIME.tv_nsec += common_ticktime__;

    if (__CURRENT_TIME.tv_nsec >= 1000000000)
    {
        __CURRENT_TIME.tv_nsec -= 1000000000;
        __CURRENT_TIME.tv_sec += 1;
    }
}
"#;

/// Render `glueVars.c` for the given variables.
pub fn render_glue(vars: &[LocatedVar]) -> String {
    let mut out = String::from(PRELUDE);
    for var in vars {
        out.push_str(&var.assignment());
        out.push('\n');
    }
    out.push_str(EPILOGUE);
    out
}

/// Parse a `LOCATED_VARIABLES.h` and render the matching `glueVars.c`.
pub fn generate_glue(located_variables: &str) -> Result<String, GlueError> {
    let vars = parse_located_variables(located_variables)?;
    Ok(render_glue(&vars))
}
