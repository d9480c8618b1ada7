//! `vapprun list` command

use super::workspace;
use anyhow::Result;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use vapprun_core::{DeployParams, EntityId, EntityKind, Inventory, RunOptions};

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "PARENT")]
    parent: String,
    #[tabled(rename = "ORDER")]
    order: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "URL")]
    url: String,
}

fn or_dash(value: String) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value
    }
}

/// List every entity in the workspace.
pub async fn list(options: RunOptions) -> Result<()> {
    let verbose = options.verbose;
    let mut orchestrator = workspace::open(options).await?;
    let inventory = orchestrator.inventory_mut();

    let ids: Vec<_> = inventory.ids().collect();
    if ids.is_empty() {
        println!("No VMs or vApps in workspace");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        let url = inventory.expanded_app_url(id)?;
        let entity = inventory.entity(id);
        let kind = match entity.kind {
            EntityKind::VApp => "vApp",
            EntityKind::Vm(_) => "VM",
        };
        rows.push(EntityRow {
            name: entity.name.clone(),
            kind: kind.to_string(),
            parent: or_dash(entity.link.as_ref().map(|l| l.name.clone()).unwrap_or_default()),
            order: or_dash(entity.link.as_ref().map(|l| l.start_order.to_string()).unwrap_or_default()),
            state: entity.state.to_string(),
            ip: or_dash(entity.ip.clone()),
            url: or_dash(url),
        });
    }

    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{}", table);

    if verbose {
        for root in inventory.roots() {
            print_deploy_params(inventory, root)?;
        }
    }

    Ok(())
}

/// Deploy parameters of the tree under `root`, then its links.
fn print_deploy_params(inventory: &mut Inventory, root: EntityId) -> Result<()> {
    let name = inventory.entity(root).name.clone();
    let dp: &DeployParams = inventory.deploy_params(root)?;

    let file = dp.file().map(|f| f.display().to_string()).unwrap_or_default();
    println!();
    println!("{} {}", name.bold(), file.dimmed());
    println!("  allocation policy: {}", dp.allocation_policy);
    for (key, value) in dp.user_items() {
        println!("  {} = {}", key, value);
    }
    for key in dp.ip_keys().iter().filter(|k| !dp.is_user_configurable_key(k)) {
        println!("  {} = {} {}", key, dp.param(key), "(managed)".dimmed());
    }

    for id in inventory.ids().filter(|id| *id != root && inventory.root_of(*id) == root) {
        let entity = inventory.entity(id);
        if let Some(link) = &entity.link {
            println!("  {} {}", entity.name, link);
        }
    }
    Ok(())
}
