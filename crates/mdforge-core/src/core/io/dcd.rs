//! CHARMM/NAMD-style DCD trajectories.
//!
//! A DCD file is a sequence of Fortran unformatted records (`len | payload | len`).
//! The header carries the frame count, the atom count and flags for an optional
//! per-frame unit cell block; each frame stores X, Y and Z as separate `f32` records.
//! Both byte orders are accepted on read; files are written little-endian.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

const HEADER_LEN: usize = 84;
const TITLE_LEN: usize = 80;
const UNIT_CELL_LEN: usize = 48;
const CHARMM_VERSION: i32 = 24;

#[derive(Debug, Error)]
pub enum DcdError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed DCD file: {0}")]
    Format(String),
    #[error("DCD files with fixed atoms are not supported ({0} fixed atoms)")]
    FixedAtomsUnsupported(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcdFrame {
    /// Raw unit cell block in CHARMM order: `[a, gamma, b, beta, alpha, c]`.
    pub unit_cell: Option<[f64; 6]>,
    pub positions: Vec<[f32; 3]>,
}

impl DcdFrame {
    pub fn box_lengths(&self) -> Option<[f64; 3]> {
        self.unit_cell.map(|uc| [uc[0], uc[2], uc[5]])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcdTrajectory {
    pub num_atoms: usize,
    pub timestep: f32,
    pub frames: Vec<DcdFrame>,
}

struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> RecordReader<'a> {
    fn new(data: &'a [u8]) -> Result<Self, DcdError> {
        let head: [u8; 4] = data
            .get(0..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| DcdError::Format("file is shorter than a record marker".into()))?;
        let big_endian = if u32::from_le_bytes(head) as usize == HEADER_LEN {
            false
        } else if u32::from_be_bytes(head) as usize == HEADER_LEN {
            true
        } else {
            return Err(DcdError::Format(
                "first record is not an 84-byte DCD header".into(),
            ));
        };
        Ok(Self {
            data,
            pos: 0,
            big_endian,
        })
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(offset..offset + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    /// Reads one Fortran record, returning `None` if the data ends before the record does.
    fn record(&mut self) -> Result<Option<&'a [u8]>, DcdError> {
        let Some(len) = self.u32_at(self.pos).map(|l| l as usize) else {
            return Ok(None);
        };
        let start = self.pos + 4;
        let end = start + len;
        let Some(trailer) = self.u32_at(end) else {
            return Ok(None);
        };
        if trailer as usize != len {
            return Err(DcdError::Format(format!(
                "record marker mismatch at byte {} ({} vs {})",
                self.pos, len, trailer
            )));
        }
        self.pos = end + 4;
        Ok(Some(&self.data[start..end]))
    }

    fn required_record(&mut self, what: &str) -> Result<&'a [u8], DcdError> {
        self.record()?
            .ok_or_else(|| DcdError::Format(format!("file ends inside the {} record", what)))
    }

    fn i32s(&self, payload: &[u8]) -> Vec<i32> {
        payload
            .chunks_exact(4)
            .map(|c| {
                let b = [c[0], c[1], c[2], c[3]];
                if self.big_endian {
                    i32::from_be_bytes(b)
                } else {
                    i32::from_le_bytes(b)
                }
            })
            .collect()
    }

    fn f32s(&self, payload: &[u8]) -> Vec<f32> {
        payload
            .chunks_exact(4)
            .map(|c| {
                let b = [c[0], c[1], c[2], c[3]];
                if self.big_endian {
                    f32::from_be_bytes(b)
                } else {
                    f32::from_le_bytes(b)
                }
            })
            .collect()
    }

    fn f64s(&self, payload: &[u8]) -> Vec<f64> {
        payload
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                if self.big_endian {
                    f64::from_be_bytes(b)
                } else {
                    f64::from_le_bytes(b)
                }
            })
            .collect()
    }
}

impl DcdTrajectory {
    pub fn read_from(mut reader: impl Read) -> Result<Self, DcdError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let mut rr = RecordReader::new(&data)?;

        let header = rr.required_record("header")?;
        if &header[0..4] != b"CORD" {
            return Err(DcdError::Format("header does not start with 'CORD'".into()));
        }
        let icntrl = rr.i32s(&header[4..]);
        let fixed_atoms = icntrl[8];
        let timestep = f32::from_bits(icntrl[9] as u32);
        let is_charmm = icntrl[19] != 0;
        let has_unit_cell = is_charmm && icntrl[10] != 0;
        let has_fourth_dim = is_charmm && icntrl[11] != 0;

        if fixed_atoms != 0 {
            return Err(DcdError::FixedAtomsUnsupported(fixed_atoms));
        }

        rr.required_record("title")?;

        let natom_record = rr.required_record("atom count")?;
        let num_atoms = match rr.i32s(natom_record).first() {
            Some(&n) if n >= 0 => n as usize,
            _ => return Err(DcdError::Format("invalid atom count record".into())),
        };

        let mut frames = Vec::new();

        while rr.remaining() > 0 {
            match Self::read_frame(&mut rr, num_atoms, has_unit_cell, has_fourth_dim)? {
                Some(frame) => frames.push(frame),
                None => {
                    warn!(
                        frame = frames.len(),
                        "DCD file ends inside a frame; dropping the incomplete frame."
                    );
                    break;
                }
            }
        }

        Ok(Self {
            num_atoms,
            timestep,
            frames,
        })
    }

    fn read_frame(
        rr: &mut RecordReader<'_>,
        num_atoms: usize,
        has_unit_cell: bool,
        has_fourth_dim: bool,
    ) -> Result<Option<DcdFrame>, DcdError> {
        let unit_cell = if has_unit_cell {
            let Some(payload) = rr.record()? else {
                return Ok(None);
            };
            if payload.len() != UNIT_CELL_LEN {
                return Err(DcdError::Format(format!(
                    "unit cell record has {} bytes, expected {}",
                    payload.len(),
                    UNIT_CELL_LEN
                )));
            }
            let values = rr.f64s(payload);
            Some([
                values[0], values[1], values[2], values[3], values[4], values[5],
            ])
        } else {
            None
        };

        let mut axes = Vec::with_capacity(3);
        for _ in 0..3 {
            let Some(payload) = rr.record()? else {
                return Ok(None);
            };
            axes.push(rr.f32s(payload));
        }
        if has_fourth_dim && rr.record()?.is_none() {
            return Ok(None);
        }

        if axes.iter().any(|axis| axis.len() != num_atoms) {
            return Err(DcdError::Format(format!(
                "coordinate record does not hold {} atoms",
                num_atoms
            )));
        }

        let positions = (0..num_atoms)
            .map(|i| [axes[0][i], axes[1][i], axes[2][i]])
            .collect();
        Ok(Some(DcdFrame {
            unit_cell,
            positions,
        }))
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, DcdError> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }

    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), DcdError> {
        let with_cell = self.frames.first().is_some_and(|f| f.unit_cell.is_some());
        if self
            .frames
            .iter()
            .any(|f| f.unit_cell.is_some() != with_cell)
        {
            return Err(DcdError::Format(
                "either all frames or none must carry a unit cell".into(),
            ));
        }
        if let Some(bad) = self
            .frames
            .iter()
            .position(|f| f.positions.len() != self.num_atoms)
        {
            return Err(DcdError::Format(format!(
                "frame {} does not hold {} atoms",
                bad, self.num_atoms
            )));
        }

        let mut icntrl = [0i32; 20];
        icntrl[0] = self.frames.len() as i32;
        icntrl[2] = 1;
        icntrl[3] = self.frames.len() as i32;
        icntrl[9] = self.timestep.to_bits() as i32;
        icntrl[10] = i32::from(with_cell);
        icntrl[19] = CHARMM_VERSION;

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(b"CORD");
        for value in icntrl {
            header.extend_from_slice(&value.to_le_bytes());
        }
        write_record(writer, &header)?;

        let mut title = Vec::with_capacity(4 + TITLE_LEN);
        title.extend_from_slice(&1i32.to_le_bytes());
        let mut line = format!("REMARKS written by mdforge {}", env!("CARGO_PKG_VERSION"))
            .into_bytes();
        line.resize(TITLE_LEN, b' ');
        title.extend_from_slice(&line);
        write_record(writer, &title)?;

        write_record(writer, &(self.num_atoms as i32).to_le_bytes())?;

        for frame in &self.frames {
            if let Some(cell) = frame.unit_cell {
                let bytes: Vec<u8> = cell.iter().flat_map(|v| v.to_le_bytes()).collect();
                write_record(writer, &bytes)?;
            }
            for axis in 0..3 {
                let bytes: Vec<u8> = frame
                    .positions
                    .iter()
                    .flat_map(|p| p[axis].to_le_bytes())
                    .collect();
                write_record(writer, &bytes)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), DcdError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)
    }
}

fn write_record(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len = (payload.len() as u32).to_le_bytes();
    writer.write_all(&len)?;
    writer.write_all(payload)?;
    writer.write_all(&len)
}
