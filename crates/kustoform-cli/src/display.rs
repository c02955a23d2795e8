//! Terminal rendering of plans, diffs and managed state

use console::{Style, style};
use kustoform_kube::diff::LineType;
use kustoform_kube::{ChangeType, DiffEngine, DiffResult, ManagedState};

/// Status name styled by severity
pub fn status(state: &ManagedState) -> console::StyledObject<&'static str> {
    let name = state.state.status_name();
    match name {
        "applied" => style(name).green(),
        "failed" => style(name).red(),
        "pending" => style(name).yellow(),
        _ => style(name).dim(),
    }
}

/// Print every change with its line diff
pub fn print_diff(diff: &DiffResult) {
    for change in &diff.changes {
        let (marker, header) = match change.change_type {
            ChangeType::Added => ("+", Style::new().green().bold()),
            ChangeType::Modified => ("~", Style::new().yellow().bold()),
            ChangeType::Removed => ("-", Style::new().red().bold()),
        };
        println!(
            "{} {} ({})",
            header.apply_to(marker),
            header.apply_to(change.display_name()),
            change.change_type
        );

        for line in &change.diff.lines {
            match line.line_type {
                LineType::Added => println!("    {}", style(format!("+{}", line.content)).green()),
                LineType::Removed => println!("    {}", style(format!("-{}", line.content)).red()),
                LineType::Context => println!("    {}", style(format!(" {}", line.content)).dim()),
            }
        }
        println!();
    }

    println!("{} {}", style("Plan:").bold(), DiffEngine::new().summary(diff));
}

/// Print the table header and one row per state
pub fn print_states(states: &[ManagedState]) {
    println!(
        "{:<25} {:<12} {:<8} {:<12} {:<10} {:<20}",
        style("NAME").bold(),
        style("WORKSPACE").bold(),
        style("SERIAL").bold(),
        style("STATUS").bold(),
        style("OBJECTS").bold(),
        style("UPDATED").bold()
    );

    for state in states {
        println!(
            "{:<25} {:<12} {:<8} {:<12} {:<10} {:<20}",
            state.name,
            state.workspace,
            state.serial,
            status(state),
            state.objects.len(),
            state.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

/// Print a single state with the identity of every recorded object
pub fn print_state(state: &ManagedState) {
    println!("{}: {}", style("Name").bold(), style(&state.name).cyan());
    println!("{}: {}", style("Workspace").bold(), state.workspace);
    println!("{}: {}", style("Serial").bold(), state.serial);
    println!("{}: {}", style("Status").bold(), status(state));
    if let kustoform_kube::StateStatus::Failed { reason, .. } = &state.state {
        println!("{}: {}", style("Reason").bold(), style(reason).red());
    }
    println!("{}: {}", style("ID").bold(), crate::util::short_id(&state.id, 16));
    if let Some(workdir) = &state.workdir {
        println!("{}: {}", style("Workdir").bold(), workdir.display());
    }
    println!(
        "{}: {}",
        style("Updated").bold(),
        state.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    println!("\n{} ({})", style("Objects").bold(), state.objects.len());
    match state.parsed_objects() {
        Ok(objects) => {
            for object in objects {
                match kustoform_kube::ObjectRef::from_value(&object) {
                    Ok(reference) => println!("  {}", reference),
                    Err(e) => println!("  {}", style(e).red()),
                }
            }
        }
        Err(e) => println!("  {}", style(e).red()),
    }
}
