use console::style;
use strata_engine::{
    resolve_default_group, GroupId, MigrationConfig, MigrationGenerator, MigrationRepository,
    MigrationResult,
};

pub fn create(config: &MigrationConfig, name: &str) -> MigrationResult<()> {
    let repository = MigrationRepository::from_config(config);
    let generator = MigrationGenerator::new(repository.clone());

    let group = generator.create_group(name)?;
    println!(
        "{} {}",
        style("Created group:").green(),
        repository.group_path(&group).display()
    );
    Ok(())
}

pub fn list(config: &MigrationConfig) -> MigrationResult<()> {
    let repository = MigrationRepository::from_config(config);
    let groups = repository.list_groups()?;
    let default = resolve_default_group(repository.base_path())?;

    let lines = group_lines(&groups, default.group());
    if lines.is_empty() {
        println!(
            "No migration groups in {}",
            repository.base_path().display()
        );
        return Ok(());
    }

    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// One line per group, the default one marked with `*`.
///
/// A default without a numeric prefix gets a line of its own.
fn group_lines(groups: &[GroupId], default: Option<&GroupId>) -> Vec<String> {
    let mut lines: Vec<String> = groups
        .iter()
        .map(|group| {
            if Some(group) == default {
                format!("* {} (default)", group)
            } else {
                format!("  {}", group)
            }
        })
        .collect();

    if let Some(default) = default {
        if !groups.contains(default) {
            lines.push(format!("* {} (default, no numeric prefix)", default));
        }
    }
    lines
}
