use crate::cli::InspectArgs;
use crate::error::{CliError, Result};
use mdforge::core::archive::{ArchiveFile, AttrValue, Group, LAYOUT_ATTR};
use std::fmt::Write;
use tracing::info;

const PREVIEW_ITEMS: usize = 6;

pub fn run(args: InspectArgs) -> Result<()> {
    info!("Reading archive {:?}", &args.file);
    let archive = ArchiveFile::read_from_path(&args.file).map_err(|e| CliError::FileParsing {
        path: args.file.clone(),
        source: e.into(),
    })?;
    print!("{}", render(&archive));
    Ok(())
}

/// The group tree with attributes and dataset shapes, one entry per line.
pub fn render(archive: &ArchiveFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "layout: {}", archive.layout().unwrap_or("<none>"));
    render_group(&mut out, &archive.root, "", 0);
    out
}

fn render_group(out: &mut String, group: &Group, path: &str, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{}{}/", indent, path);
    // The root layout attribute is already printed in the header.
    let attrs = group
        .attrs()
        .filter(|&(name, _)| depth > 0 || name != LAYOUT_ATTR);
    for (name, value) in attrs {
        let _ = writeln!(out, "{}  @{} = {}", indent, name, format_attr(value));
    }
    for (name, dataset) in group.datasets() {
        let _ = writeln!(
            out,
            "{}  {} {} {:?}",
            indent,
            name,
            dataset.data().dtype(),
            dataset.shape()
        );
    }
    for (name, child) in group.groups() {
        render_group(out, child, &format!("{}/{}", path, name), depth + 1);
    }
}

fn format_attr(value: &AttrValue) -> String {
    match value {
        AttrValue::Int(v) => v.to_string(),
        AttrValue::Float(v) => v.to_string(),
        AttrValue::Text(v) => format!("{:?}", v),
        AttrValue::IntArray(v) => preview(v.iter().map(ToString::to_string), v.len()),
        AttrValue::FloatArray(v) => preview(v.iter().map(ToString::to_string), v.len()),
        AttrValue::TextArray(v) => preview(v.iter().map(|s| format!("{:?}", s)), v.len()),
    }
}

fn preview(items: impl Iterator<Item = String>, len: usize) -> String {
    let shown: Vec<String> = items.take(PREVIEW_ITEMS).collect();
    if len > PREVIEW_ITEMS {
        format!("[{}, ... ({} items)]", shown.join(", "), len)
    } else {
        format!("[{}]", shown.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdforge::core::archive::Dataset;

    #[test]
    fn render_lists_attributes_datasets_and_nested_groups() {
        let mut archive = ArchiveFile::new("mdforge-protein-only");
        let molecule = archive.root.group_mut("1abcA00");
        molecule.set_attr("sequence", "MK");
        molecule.set_attr("numResidues", 2i64);
        molecule.set_dataset(
            "pdbCoords",
            Dataset::float32(vec![2, 3], vec![0.0; 6]).unwrap(),
        );
        let replica = molecule.group_mut("sims320K").group_mut("0");
        replica.set_attr("numFrames", 5i64);
        replica.set_attr("temperatures", AttrValue::IntArray((0..10).collect()));

        let text = render(&archive);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "layout: mdforge-protein-only");
        assert_eq!(lines[1], "/");
        assert_eq!(lines[2], "  /1abcA00/");
        assert_eq!(text.matches("mdforge-protein-only").count(), 1);
        assert!(text.contains("    @sequence = \"MK\""));
        assert!(text.contains("    @numResidues = 2"));
        assert!(text.contains("    pdbCoords float32 [2, 3]"));
        assert!(text.contains("    /1abcA00/sims320K/"));
        assert!(text.contains("        @numFrames = 5"));
        assert!(text.contains("@temperatures = [0, 1, 2, 3, 4, 5, ... (10 items)]"));
    }

    #[test]
    fn other_root_attributes_are_still_listed() {
        let mut archive = ArchiveFile::new("mdforge-protein-only");
        archive.root.set_attr("createdBy", "mdforge");
        let text = render(&archive);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1..], ["/", "  @createdBy = \"mdforge\""]);
    }

    #[test]
    fn unreadable_archive_is_a_parsing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json.zst");
        std::fs::write(&path, b"not an archive").unwrap();
        let result = run(InspectArgs { file: path });
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }
}
