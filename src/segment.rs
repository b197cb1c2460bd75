use std::fmt;

use anyhow::bail;

#[derive(Debug)]
pub enum Segment {
    // base address of `local` segment in the a function
    // RAM[1]
    Local,
    // base address of `argument` segment in the a function
    // RAM[2]
    Argument,
    Static,
    // no-mapping
    Constant,
    // RAM[3]
    This,
    // RAM[4]
    That,
    // RAM[3, 4]
    Pointer,
    // RAM[5 - 12]
    Temp,
}

impl TryFrom<&str> for Segment {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        use Segment::*;

        let segment = match s {
            "local" => Local,
            "argument" => Argument,
            "static" => Static,
            "constant" => Constant,
            "this" => This,
            "that" => That,
            "pointer" => Pointer,
            "temp" => Temp,
            _ => bail!("Unknown segment: {s}"),
        };

        Ok(segment)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Segment::*;

        let seg = match self {
            Local => "local",
            Argument => "argument",
            Static => "static",
            Constant => "constant",
            This => "this",
            That => "that",
            Pointer => "pointer",
            Temp => "temp",
        };

        write!(f, "{seg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_known_segments() {
        for name in ["local", "argument", "static", "constant", "this", "that", "pointer", "temp"] {
            assert!(Segment::try_from(name).is_ok());
        }
    }

    #[test]
    fn rejects_unknown_segment() {
        assert!(Segment::try_from("frame").is_err());
    }

    #[test]
    fn display_round_trips_parse() {
        for name in ["local", "argument", "static", "constant", "this", "that", "pointer", "temp"] {
            let seg = Segment::try_from(name).unwrap();
            assert_eq!(seg.to_string(), name);
        }
    }
}
