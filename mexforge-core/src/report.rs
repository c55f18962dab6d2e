use crate::disc::DiscSummary;

/// A recoverable problem found while compiling. The affected value was
/// replaced by a default or sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub pass: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    pub completed: Vec<&'static str>,
    /// Passes whose template was absent.
    pub skipped: Vec<&'static str>,
    pub warnings: Vec<Warning>,
    pub disc: Option<DiscSummary>,
}

impl CompileReport {
    pub fn warnings_for(&self, pass: &str) -> impl Iterator<Item = &Warning> + '_ {
        let pass = pass.to_string();
        self.warnings.iter().filter(move |w| w.pass == pass)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Completed passes: {}\n", self.completed.join(", ")));
        if !self.skipped.is_empty() {
            out.push_str(&format!("Skipped passes (template missing): {}\n", self.skipped.join(", ")));
        }
        if self.warnings.is_empty() {
            out.push_str("No warnings.\n");
        } else {
            out.push_str(&format!("{} warning(s):\n", self.warnings.len()));
            for warning in &self.warnings {
                out.push_str(&format!("  [{}] {}\n", warning.pass, warning.message));
            }
        }
        if let Some(disc) = &self.disc {
            out.push_str(&format!(
                "Disc image: {} files, {} bytes, CRC32 {:08X}\n",
                disc.file_count, disc.size, disc.crc32
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_skips_and_warnings() {
        let report = CompileReport {
            completed: vec!["sound", "data table"],
            skipped: vec!["trophy"],
            warnings: vec![Warning {
                pass: "sss",
                message: "stage 0 (Battlefield): icon assets/bf.png is missing".to_string(),
            }],
            disc: None,
        };
        let text = report.render();
        assert!(text.contains("Completed passes: sound, data table"));
        assert!(text.contains("Skipped passes (template missing): trophy"));
        assert!(text.contains("  [sss] stage 0 (Battlefield)"));
        assert_eq!(report.warnings_for("sss").count(), 1);
        assert_eq!(report.warnings_for("css").count(), 0);
    }

    #[test]
    fn render_includes_disc_summary() {
        let report = CompileReport {
            completed: vec!["patches"],
            disc: Some(DiscSummary { size: 0x2800, crc32: 0xCAFE_F00D, file_count: 2 }),
            ..CompileReport::default()
        };
        assert_eq!(
            report.render(),
            "Completed passes: patches\nNo warnings.\nDisc image: 2 files, 10240 bytes, CRC32 CAFEF00D\n"
        );
    }
}
