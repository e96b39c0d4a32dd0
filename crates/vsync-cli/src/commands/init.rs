//! Init command - writes a node's config and its epoch-0 view.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use vsync_config::{ConfigLoader, Paths, VsyncConfig};
use vsync_types::{NodeAddress, NodeId};
use vsync_view::{View, load_view, save_view};

pub fn run(dir: &str, id: u32, members: &[String], force: bool) -> Result<()> {
    let (config_path, view_path) = initialize(Path::new(dir), id, members, force)?;
    println!("Wrote {}", config_path.display());
    println!("Wrote {}", view_path.display());
    Ok(())
}

/// Writes `vsync.toml` and the founding view. Returns both paths.
pub fn initialize(
    project_dir: &Path,
    id: u32,
    members: &[String],
    force: bool,
) -> Result<(PathBuf, PathBuf)> {
    if Paths::is_initialized(project_dir) && !force {
        bail!(
            "{} already has a {}; pass --force to overwrite",
            project_dir.display(),
            vsync_config::PROJECT_CONFIG_FILE
        );
    }

    let members = members
        .iter()
        .map(String::as_str)
        .map(parse_member)
        .collect::<Result<Vec<_>>>()?;
    let me = NodeId::try_from(id).with_context(|| format!("node id {id} is reserved"))?;
    let address = members
        .iter()
        .find(|(node, _)| *node == me)
        .map(|(_, address)| address.clone())
        .with_context(|| format!("node {me} is not among the listed members"))?;
    let view = View::initial(members, me).context("invalid member list")?;

    let mut config = VsyncConfig::default();
    config.node.id = id;
    config.node.address = address.to_string();
    config.validate()?;

    fs::create_dir_all(project_dir).context("failed to create project directory")?;
    let config_path = config.write_project_file(project_dir)?;

    // Reload so env and local overrides decide where the view goes.
    let resolved = ConfigLoader::new().with_project_dir(project_dir).load()?;
    let view_path = resolved.view_path();
    if !force && load_view(&view_path)?.is_some() {
        bail!("{} already holds a view", view_path.display());
    }
    fs::create_dir_all(&resolved.node.data_dir)
        .with_context(|| format!("failed to create {}", resolved.node.data_dir.display()))?;
    save_view(&view_path, &view)?;

    tracing::info!(node = %me, members = view.num_members(), "initialized node");
    Ok((config_path, view_path))
}

/// Parses `id=address`.
pub fn parse_member(member: &str) -> Result<(NodeId, NodeAddress)> {
    let (id, address) = member
        .split_once('=')
        .with_context(|| format!("member {member:?} is not of the form id=address"))?;
    let id = id
        .trim()
        .parse::<NodeId>()
        .with_context(|| format!("member {member:?} has a bad id"))?;
    let address = NodeAddress::new(address.trim())
        .with_context(|| format!("member {member:?} has a bad address"))?;
    Ok((id, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<String> {
        vec![
            "0=10.0.0.1:7000".to_string(),
            "1=10.0.0.2:7000".to_string(),
            "2=10.0.0.3:7000".to_string(),
        ]
    }

    #[test]
    fn parses_member_specs() {
        let (id, address) = parse_member("3=host:9").unwrap();
        assert_eq!(id, NodeId::new(3));
        assert_eq!(address.as_str(), "host:9");

        assert!(parse_member("host:9").is_err());
        assert!(parse_member("x=host:9").is_err());
        assert!(parse_member("3=").is_err());
    }

    #[test]
    fn writes_config_and_view() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, view_path) = initialize(dir.path(), 1, &members(), false).unwrap();

        assert!(config_path.exists());
        let view = load_view(&view_path).unwrap().unwrap();
        assert_eq!(view.num_members(), 3);
        assert_eq!(view.my_rank(), 1);
        assert_eq!(view.epoch_id().as_u64(), 0);

        let config = VsyncConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.node.id, 1);
        assert_eq!(config.node.address, "10.0.0.2:7000");
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        initialize(dir.path(), 0, &members(), false).unwrap();
        assert!(initialize(dir.path(), 0, &members(), false).is_err());
        initialize(dir.path(), 2, &members(), true).unwrap();
    }

    #[test]
    fn reserved_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let members = vec!["0=10.0.0.1:7000".to_string()];
        let err = initialize(dir.path(), u32::MAX, &members, false).unwrap_err();
        assert!(err.to_string().contains("reserved"));
        assert!(!Paths::is_initialized(dir.path()));
    }

    #[test]
    fn node_must_be_a_member() {
        let dir = tempfile::tempdir().unwrap();
        assert!(initialize(dir.path(), 9, &members(), false).is_err());
    }
}
