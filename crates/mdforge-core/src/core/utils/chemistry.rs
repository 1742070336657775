use phf::{Map, phf_map};

static ATOMIC_NUMBERS: Map<&'static str, i64> = phf_map! {
    "H" => 1, "D" => 1, "HE" => 2, "LI" => 3, "BE" => 4, "B" => 5, "C" => 6, "N" => 7,
    "O" => 8, "F" => 9, "NE" => 10, "NA" => 11, "MG" => 12, "AL" => 13, "SI" => 14,
    "P" => 15, "S" => 16, "CL" => 17, "AR" => 18, "K" => 19, "CA" => 20, "MN" => 25,
    "FE" => 26, "CO" => 27, "NI" => 28, "CU" => 29, "ZN" => 30, "SE" => 34, "BR" => 35,
    "I" => 53,
};

// Standard atomic weights (g/mol).
static ATOMIC_MASSES: Map<&'static str, f64> = phf_map! {
    "H" => 1.008, "D" => 2.014, "HE" => 4.0026, "LI" => 6.94, "BE" => 9.0122, "B" => 10.81,
    "C" => 12.011, "N" => 14.007, "O" => 15.999, "F" => 18.998, "NE" => 20.180,
    "NA" => 22.990, "MG" => 24.305, "AL" => 26.982, "SI" => 28.085, "P" => 30.974,
    "S" => 32.06, "CL" => 35.45, "AR" => 39.948, "K" => 39.098, "CA" => 40.078,
    "MN" => 54.938, "FE" => 55.845, "CO" => 58.933, "NI" => 58.693, "CU" => 63.546,
    "ZN" => 65.38, "SE" => 78.971, "BR" => 79.904, "I" => 126.90,
};

static RESIDUE_ONE_LETTER: Map<&'static str, char> = phf_map! {
    "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D', "CYS" => 'C',
    "GLN" => 'Q', "GLU" => 'E', "GLY" => 'G', "HIS" => 'H', "ILE" => 'I',
    "LEU" => 'L', "LYS" => 'K', "MET" => 'M', "PHE" => 'F', "PRO" => 'P',
    "SER" => 'S', "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
    // Protonation and force-field variants.
    "HSD" => 'H', "HSE" => 'H', "HSP" => 'H', "HID" => 'H', "HIE" => 'H', "HIP" => 'H',
    "CYX" => 'C', "ASH" => 'D', "GLH" => 'E', "LYN" => 'K', "MSE" => 'M',
};

pub fn atomic_number(element: &str) -> Option<i64> {
    ATOMIC_NUMBERS.get(element.trim().to_ascii_uppercase().as_str()).copied()
}

pub fn atomic_mass(element: &str) -> Option<f64> {
    ATOMIC_MASSES.get(element.trim().to_ascii_uppercase().as_str()).copied()
}

pub fn one_letter_code(residue_name: &str) -> Option<char> {
    RESIDUE_ONE_LETTER.get(residue_name.trim()).copied()
}

pub fn is_protein_residue(residue_name: &str) -> bool {
    one_letter_code(residue_name).is_some()
}

pub fn is_hydrogen(element: &str) -> bool {
    matches!(atomic_number(element), Some(1))
}

/// Guesses an element symbol from the raw four-column PDB atom name field.
///
/// By PDB convention two-letter elements start in the first column of the name field,
/// while single-letter elements are preceded by a space or a digit.
pub fn element_from_atom_name(raw_name: &str) -> String {
    let first = raw_name.chars().next().unwrap_or(' ');
    let letters: String = raw_name
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == ' ')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    if first.is_ascii_alphabetic() && letters.len() >= 2 && raw_name.trim_end().len() < 4 {
        let candidate = letters[..2].to_ascii_uppercase();
        if ATOMIC_NUMBERS.contains_key(candidate.as_str()) {
            return candidate;
        }
    }

    letters
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_default()
}
