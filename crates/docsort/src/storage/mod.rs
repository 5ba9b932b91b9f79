pub mod filesystem;

pub use filesystem::{FileOps, FileOrganizer, StdFileOps};

/// Highest numeric suffix tried when resolving name collisions.
pub const MAX_COLLISION_SUFFIX: u32 = 1000;

/// Candidate names in the order they are tried: `name.ext`, `name_2.ext`, ... `name_1000.ext`.
///
/// A leading dot is part of the base name, so `.hidden` becomes `.hidden_2`.
pub fn candidate_names(filename: &str) -> impl Iterator<Item = String> + '_ {
    let (base, ext) = match filename.rfind('.') {
        Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
        _ => (filename, None),
    };

    (1..=MAX_COLLISION_SUFFIX).map(move |counter| match (counter, ext) {
        (1, _) => filename.to_string(),
        (n, Some(ext)) => format!("{}_{}{}", base, n, ext),
        (n, None) => format!("{}_{}", base, n),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_names() {
        let names: Vec<String> = candidate_names("report.pdf").take(3).collect();
        assert_eq!(names, vec!["report.pdf", "report_2.pdf", "report_3.pdf"]);

        let names: Vec<String> = candidate_names("README").take(2).collect();
        assert_eq!(names, vec!["README", "README_2"]);

        assert_eq!(candidate_names("a.pdf").last().unwrap(), "a_1000.pdf");
        assert_eq!(candidate_names("a.pdf").count(), MAX_COLLISION_SUFFIX as usize);
    }

    #[test]
    fn test_candidate_names_dotfile_keeps_name_as_base() {
        let names: Vec<String> = candidate_names(".hidden").take(2).collect();
        assert_eq!(names, vec![".hidden", ".hidden_2"]);
    }

    #[test]
    fn test_candidate_names_report_stamp() {
        let names: Vec<String> = candidate_names("report_20240315_101500.json").take(2).collect();
        assert_eq!(
            names,
            vec!["report_20240315_101500.json", "report_20240315_101500_2.json"]
        );
    }
}
