use anyhow::{Context, Result};
use aura_patcher::builtin;
use aura_patcher::config::{load_all, PatchSet};
use aura_patcher::{PatchReport, PatchStatus, Patcher, StepReport};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aura-patcher")]
#[command(
    about = "Literal snippet patcher for the Project Aura client",
    long_about = "Runs ordered, exact snippet replacements against one file. \
                  With no subcommand, applies the built-in patch set that hides \
                  the messaging UI of MainForm.jsx from teachers."
)]
#[command(version)]
struct Cli {
    /// Show debug diagnostics on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct Selection {
    /// Path to workspace root (auto-detected if not specified)
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Patch set file or directory of them (defaults to the built-in set)
    #[arg(short, long)]
    patches: Option<PathBuf>,

    /// Patch this file instead of each patch set's own target
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Fail when a substitution matches nothing
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch sets to their target files
    Apply {
        #[command(flatten)]
        selection: Selection,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report how often each substitution matches, without writing
    Check {
        #[command(flatten)]
        selection: Selection,

        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the substitutions of the selected patch sets
    Show {
        /// Patch set file or directory of them (defaults to the built-in set)
        #[arg(short, long)]
        patches: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        None => cmd_default(),

        Some(Commands::Apply {
            selection,
            dry_run,
            diff,
        }) => cmd_apply(selection, dry_run, diff),

        Some(Commands::Check { selection, json }) => cmd_check(selection, json),

        Some(Commands::Show { patches }) => cmd_show(patches),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the selected patch sets, labelled by where they came from.
fn load_patch_sets(patches: Option<&Path>) -> Result<Vec<(String, PatchSet)>> {
    match patches {
        Some(path) => Ok(load_all(path)?
            .into_iter()
            .map(|(file, set)| (file.display().to_string(), set))
            .collect()),
        None => Ok(vec![(
            format!("built-in {}", builtin::HIDE_TEACHER_MESSAGES),
            builtin::hide_teacher_messages()?,
        )]),
    }
}

/// Resolve workspace path using multiple detection strategies
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. AURA_WORKSPACE environment variable
/// 3. Nearest ancestor of the current directory containing a patch target
/// 4. The current directory
fn resolve_workspace(
    cli_workspace: Option<PathBuf>,
    sets: &[(String, PatchSet)],
) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace {} does not exist", path.display()));
    }

    if let Ok(env_path) = env::var("AURA_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: AURA_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    let current = env::current_dir().context("cannot determine current directory")?;

    if let Some(path) = auto_detect_workspace(&current, sets) {
        tracing::debug!(workspace = %path.display(), "auto-detected workspace");
        return Ok(path);
    }

    Ok(current)
}

/// Walk up from `start` to the first directory holding a workspace-relative target.
fn auto_detect_workspace(start: &Path, sets: &[(String, PatchSet)]) -> Option<PathBuf> {
    let targets: Vec<&str> = sets
        .iter()
        .filter(|(_, set)| set.meta.workspace_relative)
        .map(|(_, set)| set.meta.target.as_str())
        .collect();

    start
        .ancestors()
        .find(|ancestor| targets.iter().any(|t| ancestor.join(t).is_file()))
        .map(Path::to_path_buf)
}

fn build_patcher(
    set: &PatchSet,
    workspace: &Path,
    target: Option<&Path>,
    strict: bool,
) -> Result<Patcher> {
    let patcher = match target {
        Some(path) => Patcher::new(path, set.substitutions.clone()),
        None => Patcher::from_patch_set(set, workspace)
            .with_context(|| format!("cannot resolve target {}", set.meta.target))?,
    };
    Ok(patcher.strict(set.meta.strict || strict))
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

fn print_step(step: &StepReport) {
    if step.occurrences > 0 {
        let noun = if step.occurrences == 1 {
            "occurrence"
        } else {
            "occurrences"
        };
        println!(
            "  {} {}: replaced {} {}",
            "✓".green(),
            step.id,
            step.occurrences,
            noun
        );
    } else if step.already_applied {
        println!("  {} {}: already applied", "⊙".yellow(), step.id);
    } else {
        println!("  {} {}: no match", "⊘".cyan(), step.id);
    }
}

/// No subcommand: built-in set, automatic workspace, one confirmation line.
fn cmd_default() -> Result<()> {
    let sets = load_patch_sets(None)?;
    let workspace = resolve_workspace(None, &sets)?;

    for (_, set) in &sets {
        let patcher = build_patcher(set, &workspace, None, false)?;
        let report = patcher
            .apply()
            .with_context(|| format!("failed to patch {}", patcher.target().display()))?;
        println!("{}", report.confirmation());
    }

    Ok(())
}

fn cmd_apply(selection: Selection, dry_run: bool, show_diff: bool) -> Result<()> {
    let sets = load_patch_sets(selection.patches.as_deref())?;
    let workspace = resolve_workspace(selection.workspace, &sets)?;

    println!("Workspace: {}", workspace.display());
    println!();

    let mut total_replaced = 0;
    let mut total_already_applied = 0;
    let mut total_unmatched = 0;

    for (label, set) in &sets {
        println!("Loading patches from {}...", label);

        let patcher = build_patcher(
            set,
            &workspace,
            selection.target.as_deref(),
            selection.strict,
        )?;
        let target = patcher.target().to_path_buf();

        let (preview, transformation) = patcher
            .check()
            .with_context(|| format!("failed to patch {}", target.display()))?;

        if dry_run {
            println!("{}", "  [DRY RUN - nothing will be written]".cyan());
        }

        for step in &preview.steps {
            print_step(step);
        }
        total_replaced += preview.total_occurrences();
        total_already_applied += preview.steps.iter().filter(|s| s.already_applied).count();
        total_unmatched += preview.unmatched().count();

        if show_diff && transformation.changed() {
            display_diff(
                &target,
                transformation.original.as_str(),
                transformation.patched.as_str(),
            );
        }

        if dry_run {
            match preview.status {
                PatchStatus::WouldApply => println!("Would update {}", target.display()),
                _ => println!("{} is already up to date", target.display()),
            }
        } else {
            let report = patcher
                .commit(transformation)
                .with_context(|| format!("failed to patch {}", target.display()))?;
            println!("{}", report.confirmation());
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} replaced", format!("{}", total_replaced).green());
    println!(
        "  {} already applied",
        format!("{}", total_already_applied).yellow()
    );
    println!("  {} unmatched", format!("{}", total_unmatched).cyan());

    Ok(())
}

fn cmd_check(selection: Selection, json: bool) -> Result<()> {
    let sets = load_patch_sets(selection.patches.as_deref())?;
    let workspace = resolve_workspace(selection.workspace, &sets)?;

    let mut reports: Vec<PatchReport> = Vec::with_capacity(sets.len());
    let mut mismatch = 0;

    for (label, set) in &sets {
        let strict = set.meta.strict || selection.strict;
        // Evaluate leniently so every step is reported, then judge
        let patcher = build_patcher(set, &workspace, selection.target.as_deref(), false)?;
        let (report, _) = patcher
            .check()
            .with_context(|| format!("failed to check {}", patcher.target().display()))?;

        if strict {
            mismatch += report.unmatched().count();
        }

        if !json {
            println!("{} ({})", report.target.display(), label.dimmed());
            for step in &report.steps {
                print_step(step);
            }
            println!("  status: {}", report.status);
            println!();
        }

        reports.push(report);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    if mismatch > 0 {
        eprintln!(
            "{}",
            format!("{} substitution(s) matched nothing in strict mode", mismatch).red()
        );
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_show(patches: Option<PathBuf>) -> Result<()> {
    let sets = load_patch_sets(patches.as_deref())?;

    for (label, set) in &sets {
        let name = if set.meta.name.is_empty() {
            label.as_str()
        } else {
            set.meta.name.as_str()
        };
        println!("{} ({})", name.bold(), label.dimmed());
        if let Some(description) = &set.meta.description {
            println!("  {}", description);
        }
        println!(
            "  target: {}{}",
            set.meta.target,
            if set.meta.workspace_relative {
                " (workspace-relative)"
            } else {
                ""
            }
        );
        if set.meta.strict {
            println!("  strict: yes");
        }

        for substitution in &set.substitutions {
            println!("\n  {}", substitution.id.cyan());
            let diff = TextDiff::from_lines(&substitution.search, &substitution.replacement);
            for change in diff.iter_all_changes() {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("  -{}", change).red(),
                    ChangeTag::Insert => format!("  +{}", change).green(),
                    ChangeTag::Equal => format!("   {}", change).normal(),
                };
                print!("{}", line);
                if change.missing_newline() {
                    println!();
                }
            }
        }
        println!();
    }

    Ok(())
}
