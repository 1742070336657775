use crate::core::utils::chemistry;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
    #[error("Structure contains no ATOM or HETATM records")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Line is too short for ATOM/HETATM record (must be at least 54 chars)")]
    LineTooShort,
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: &'static str, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdbAtom {
    pub name: String,
    pub residue_name: String,
    pub chain_id: char,
    pub residue_number: isize,
    pub insertion_code: char,
    pub element: String,
    pub position: [f64; 3],
    pub hetero: bool,
}

/// All ATOM/HETATM records of the first model, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbStructure {
    pub atoms: Vec<PdbAtom>,
}

fn slice(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("")
}

fn parse_float(
    line: &str,
    line_num: usize,
    start: usize,
    end: usize,
    columns: &'static str,
) -> Result<f64, PdbError> {
    let raw = slice(line, start, end).trim();
    raw.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns,
            value: raw.to_string(),
        },
    })
}

impl PdbStructure {
    pub fn read_from(reader: impl BufRead) -> Result<Self, PdbError> {
        let mut atoms = Vec::new();

        for (idx, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = idx + 1;
            let record = slice(&line, 0, 6).trim();

            match record {
                "ATOM" | "HETATM" => {
                    if line.len() < 54 {
                        return Err(PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::LineTooShort,
                        });
                    }

                    let raw_name = slice(&line, 12, 16);
                    let res_seq = slice(&line, 22, 26).trim();
                    let residue_number = res_seq.parse().map_err(|_| PdbError::Parse {
                        line: line_num,
                        kind: PdbParseErrorKind::InvalidInt {
                            columns: "23-26",
                            value: res_seq.to_string(),
                        },
                    })?;

                    let element_field = slice(&line, 76, 78).trim();
                    let element = if element_field.is_empty() {
                        chemistry::element_from_atom_name(raw_name)
                    } else {
                        element_field.to_ascii_uppercase()
                    };

                    atoms.push(PdbAtom {
                        name: raw_name.trim().to_string(),
                        residue_name: slice(&line, 17, 20).trim().to_string(),
                        chain_id: slice(&line, 21, 22).chars().next().unwrap_or(' '),
                        residue_number,
                        insertion_code: slice(&line, 26, 27).chars().next().unwrap_or(' '),
                        element,
                        position: [
                            parse_float(&line, line_num, 30, 38, "31-38")?,
                            parse_float(&line, line_num, 38, 46, "39-46")?,
                            parse_float(&line, line_num, 46, 54, "47-54")?,
                        ],
                        hetero: record == "HETATM",
                    });
                }
                // Only the first model of multi-model files describes the topology.
                "ENDMDL" => break,
                _ => {}
            }
        }

        if atoms.is_empty() {
            return Err(PdbError::Empty);
        }
        Ok(Self { atoms })
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, PdbError> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
HEADER    TEST
ATOM      1  N   GLY A   1      11.104   6.134  -6.504  1.00  0.00           N
ATOM      2  CA  GLY A   1      11.639   6.071  -5.147  1.00  0.00           C
ATOM      3  HA2 GLY A   1      12.000   7.000  -5.000  1.00  0.00
ATOM      4  CA  ALA B  12A     10.000   1.000   2.000  1.00  0.00           C
HETATM    5  O   HOH W 100       1.000   2.000   3.000  1.00  0.00           O
END
";

    #[test]
    fn parses_atom_and_hetatm_records() {
        let structure = PdbStructure::read_from(Cursor::new(SAMPLE)).unwrap();
        assert_eq!(structure.len(), 5);

        let ca = &structure.atoms[1];
        assert_eq!(ca.name, "CA");
        assert_eq!(ca.residue_name, "GLY");
        assert_eq!(ca.chain_id, 'A');
        assert_eq!(ca.residue_number, 1);
        assert_eq!(ca.element, "C");
        assert_eq!(ca.position, [11.639, 6.071, -5.147]);
        assert!(!ca.hetero);

        assert_eq!(structure.atoms[3].insertion_code, 'A');
        assert!(structure.atoms[4].hetero);
    }

    #[test]
    fn missing_element_column_is_guessed_from_atom_name() {
        let structure = PdbStructure::read_from(Cursor::new(SAMPLE)).unwrap();
        assert_eq!(structure.atoms[2].element, "H");
    }

    #[test]
    fn stops_after_first_model() {
        let input = "\
MODEL        1
ATOM      1  CA  GLY A   1      11.639   6.071  -5.147  1.00  0.00           C
ENDMDL
MODEL        2
ATOM      1  CA  GLY A   1      12.639   6.071  -5.147  1.00  0.00           C
ENDMDL
";
        let structure = PdbStructure::read_from(Cursor::new(input)).unwrap();
        assert_eq!(structure.len(), 1);
    }

    #[test]
    fn short_atom_line_is_rejected() {
        let input = "ATOM      1  CA  GLY A   1      11.639\n";
        let result = PdbStructure::read_from(Cursor::new(input));
        assert!(matches!(
            result,
            Err(PdbError::Parse {
                line: 1,
                kind: PdbParseErrorKind::LineTooShort
            })
        ));
    }

    #[test]
    fn invalid_coordinate_is_rejected() {
        let input =
            "ATOM      1  CA  GLY A   1      11.6x9   6.071  -5.147  1.00  0.00           C\n";
        let result = PdbStructure::read_from(Cursor::new(input));
        assert!(matches!(
            result,
            Err(PdbError::Parse {
                kind: PdbParseErrorKind::InvalidFloat { .. },
                ..
            })
        ));
    }

    #[test]
    fn file_without_atoms_is_empty_error() {
        let result = PdbStructure::read_from(Cursor::new("HEADER ONLY\nEND\n"));
        assert!(matches!(result, Err(PdbError::Empty)));
    }
}
