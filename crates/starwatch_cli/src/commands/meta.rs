use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_complete::Shell;

use crate::Cli;

const BIN_NAME: &str = "starwatch";

/// One rendered roff page.
#[derive(Debug)]
struct ManPage {
    file_name: String,
    roff: Vec<u8>,
}

impl ManPage {
    fn render(cmd: Command, name: &str) -> std::io::Result<Self> {
        let mut roff = Vec::new();
        clap_mangen::Man::new(cmd).title(name).render(&mut roff)?;
        Ok(Self {
            file_name: format!("{name}.1"),
            roff,
        })
    }
}

/// The top-level page followed by `starwatch-<sub>` pages for each visible
/// subcommand.
fn man_pages() -> std::io::Result<Vec<ManPage>> {
    let cli = Cli::command();
    let mut pages = vec![ManPage::render(cli.clone(), BIN_NAME)?];
    for sub in cli.get_subcommands().filter(|s| !s.is_hide_set()) {
        let name = format!("{BIN_NAME}-{}", sub.get_name());
        pages.push(ManPage::render(sub.clone(), &name)?);
    }
    Ok(pages)
}

fn write_man_pages(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    man_pages()?
        .into_iter()
        .map(|page| {
            let path = dir.join(&page.file_name);
            std::fs::write(&path, &page.roff)?;
            Ok(path)
        })
        .collect()
}

fn write_completions(shell: Shell, out: &mut impl Write) {
    clap_complete::generate(shell, &mut Cli::command(), BIN_NAME, out);
}

pub(crate) fn handle_completions(shell: Shell) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout().lock();
    write_completions(shell, &mut stdout);
    stdout.flush()?;
    Ok(())
}

pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(dir) => {
            let written = write_man_pages(&dir)?;
            tracing::debug!(pages = written.len(), dir = %dir.display(), "Wrote man pages");
            for path in &written {
                println!("{}", path.display());
            }
        }
        None => {
            let mut pages = man_pages()?;
            if !pages.is_empty() {
                std::io::stdout().write_all(&pages.swap_remove(0).roff)?;
            }
        }
    }

    Ok(())
}
