use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::warn;

use crate::backup::{RunOptions, begin_run};
use crate::console::Console;
use crate::vault::{Applied, ScanRules, WritePlan, file_stem, find_candidate_files};
use crate::wikilinks::{LinkMode, build_rename_index, rewrite_wikilinks};

#[derive(Debug, Clone, Default)]
pub struct FixLinksOptions {
    /// Prompt for targets matching several notes instead of skipping them.
    pub interactive: bool,
    pub rules: ScanRules,
    pub run: RunOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixLinksReport {
    pub files_scanned: usize,
    pub files_with_updates: usize,
    pub links_updated: usize,
    pub ambiguous_skipped: usize,
    pub failed: usize,
    pub backup: Option<PathBuf>,
}

impl FixLinksReport {
    pub fn print(&self, console: &mut dyn Console, interactive: bool) {
        console.say("");
        console.say("summary:");
        console.say(&format!("files scanned: {}", self.files_scanned));
        console.say(&format!("files with updates: {}", self.files_with_updates));
        console.say(&format!("links updated: {}", self.links_updated));
        if !interactive && self.ambiguous_skipped > 0 {
            console.say(&format!("ambiguous links skipped: {}", self.ambiguous_skipped));
        }
        if self.failed > 0 {
            console.say(&format!("failed: {}", self.failed));
        }
        if let Some(path) = &self.backup {
            console.say(&format!("backup: {}", path.display()));
        }
    }
}

/// Point bare `[[Title]]` links at their `Title (Year)` notes across the
/// whole vault.
pub fn fix_links(
    vault_root: &Path,
    options: &FixLinksOptions,
    console: &mut dyn Console,
) -> Result<FixLinksReport> {
    let files = find_candidate_files(vault_root, &options.rules)?;
    let index = build_rename_index(files.iter().map(|path| file_stem(path)));
    let mut report = FixLinksReport {
        files_scanned: files.len(),
        ..FixLinksReport::default()
    };
    if index.is_empty() {
        console.say("no notes named in 'Title (Year)' form; nothing to fix");
        return Ok(report);
    }

    let run = begin_run(vault_root, &options.run, console)?;
    report.backup = run.backup;
    console.say(&format!(
        "titles with year-qualified notes: {}",
        index.len()
    ));
    console.say(&format!("scanning {} files", files.len()));

    for path in &files {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable note");
                continue;
            }
        };
        let mode = if options.interactive {
            LinkMode::Interactive(&mut *console)
        } else {
            LinkMode::NonInteractive
        };
        let outcome = rewrite_wikilinks(&content, &index, mode)?;
        let name = file_stem(path);

        if outcome.changed > 0 {
            match WritePlan::update(path, &content, outcome.text).apply(options.run.dry_run) {
                Ok(Applied::Written) => {
                    report.files_with_updates += 1;
                    report.links_updated += outcome.changed;
                    let verb = if options.run.dry_run { "would update" } else { "updated" };
                    console.say(&format!("{name}: {verb} {} link(s)", outcome.changed));
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(path = %path.display(), error = %format!("{error:#}"), "failed to rewrite links");
                    report.failed += 1;
                    console.say(&format!("failed: {name}: {error:#}"));
                }
            }
        }
        if !options.interactive && outcome.ambiguous > 0 {
            report.ambiguous_skipped += outcome.ambiguous;
            console.say(&format!(
                "{name}: skipped {} ambiguous link(s)",
                outcome.ambiguous
            ));
        }
    }

    report.print(console, options.interactive);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;
    use crate::console::{Console, ScriptedConsole, is_input_closed};

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    fn seed(root: &Path) {
        write_file(&root.join("Movies/Dune (1984).md"), "#movie");
        write_file(&root.join("Movies/Dune (2021).md"), "#movie");
        write_file(&root.join("Movies/Heat (1995).md"), "#movie");
        write_file(
            &root.join("Journal.md"),
            "Saw [[Dune]] after [[Heat|Mann's heist film]]. [[Dune]] again. [[Alien]].\n",
        );
    }

    #[test]
    fn unique_targets_are_rewritten_and_ambiguous_ones_counted() {
        let temp = tempdir().expect("tempdir");
        seed(temp.path());
        let mut console = ScriptedConsole::default();

        let report =
            fix_links(temp.path(), &FixLinksOptions::default(), &mut console).expect("fix");

        assert_eq!(report.files_scanned, 4);
        assert_eq!(report.files_with_updates, 1);
        assert_eq!(report.links_updated, 1);
        assert_eq!(report.ambiguous_skipped, 2);
        assert_eq!(
            fs::read_to_string(temp.path().join("Journal.md")).expect("journal"),
            "Saw [[Dune]] after [[Heat (1995)|Mann's heist film]]. [[Dune]] again. [[Alien]].\n"
        );
        assert!(console.printed("ambiguous links skipped: 2"));
    }

    #[test]
    fn interactive_choice_is_asked_once_per_file() {
        let temp = tempdir().expect("tempdir");
        seed(temp.path());
        let mut console = ScriptedConsole::new(["1"]);
        let options = FixLinksOptions {
            interactive: true,
            ..FixLinksOptions::default()
        };

        let report = fix_links(temp.path(), &options, &mut console).expect("fix");

        assert_eq!(console.prompts(), 1);
        assert_eq!(report.links_updated, 3);
        assert_eq!(
            fs::read_to_string(temp.path().join("Journal.md")).expect("journal"),
            "Saw [[Dune (2021)]] after [[Heat (1995)|Mann's heist film]]. [[Dune (2021)]] again. [[Alien]].\n"
        );
        assert!(!console.printed("ambiguous links skipped"));

        let again = fix_links(temp.path(), &options, &mut console).expect("second pass");
        assert_eq!(again.links_updated, 0);
    }

    #[test]
    fn dry_run_counts_without_writing() {
        let temp = tempdir().expect("tempdir");
        seed(temp.path());
        let before = fs::read_to_string(temp.path().join("Journal.md")).expect("journal");
        let options = FixLinksOptions {
            run: RunOptions::dry_run(),
            ..FixLinksOptions::default()
        };
        let mut console = ScriptedConsole::default();

        let report = fix_links(temp.path(), &options, &mut console).expect("fix");

        assert_eq!(report.links_updated, 1);
        assert!(console.printed("Journal: would update 1 link(s)"));
        assert_eq!(
            fs::read_to_string(temp.path().join("Journal.md")).expect("journal"),
            before
        );
    }

    #[test]
    fn vault_without_qualified_notes_is_left_alone() {
        let temp = tempdir().expect("tempdir");
        write_file(&temp.path().join("Heat.md"), "[[Alien]]");
        let mut console = ScriptedConsole::default();

        let report =
            fix_links(temp.path(), &FixLinksOptions::default(), &mut console).expect("fix");

        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.links_updated, 0);
        assert!(console.printed("nothing to fix"));
    }

    /// Answers prompts like a scripted console, but edits `path` behind the
    /// run's back on the first prompt.
    struct MeddlingConsole {
        inner: ScriptedConsole,
        path: PathBuf,
    }

    impl Console for MeddlingConsole {
        fn say(&mut self, line: &str) {
            self.inner.say(line);
        }

        fn ask(&mut self, prompt: &str) -> Result<String> {
            fs::write(&self.path, "edited elsewhere [[Dune]]\n").expect("edit note");
            self.inner.ask(prompt)
        }
    }

    #[test]
    fn one_failed_file_does_not_stop_the_batch() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("Dune (1984).md"), "#movie");
        write_file(&root.join("Dune (2021).md"), "#movie");
        write_file(&root.join("Heat (1995).md"), "#movie");
        write_file(&root.join("A.md"), "[[Dune]]\n");
        write_file(&root.join("B.md"), "[[Heat]]\n");
        let mut console = MeddlingConsole {
            inner: ScriptedConsole::new(["1"]),
            path: root.join("A.md"),
        };
        let options = FixLinksOptions {
            interactive: true,
            ..FixLinksOptions::default()
        };

        let report = fix_links(root, &options, &mut console).expect("fix");

        assert_eq!(report.failed, 1);
        assert_eq!(report.files_with_updates, 1);
        assert!(console.inner.printed("failed: A: "));
        assert!(console.inner.printed("failed: 1"));
        assert_eq!(
            fs::read_to_string(root.join("A.md")).expect("a"),
            "edited elsewhere [[Dune]]\n"
        );
        assert_eq!(
            fs::read_to_string(root.join("B.md")).expect("b"),
            "[[Heat (1995)]]\n"
        );
    }

    #[test]
    fn closed_input_aborts_the_run() {
        let temp = tempdir().expect("tempdir");
        seed(temp.path());
        let options = FixLinksOptions {
            interactive: true,
            ..FixLinksOptions::default()
        };

        let error = fix_links(temp.path(), &options, &mut ScriptedConsole::default())
            .expect_err("input closed");
        assert!(is_input_closed(&error));
        assert!(
            fs::read_to_string(temp.path().join("Journal.md"))
                .expect("journal")
                .starts_with("Saw [[Dune]]")
        );
    }
}
