//! The seam that supplies the current cluster membership to the coordinator and the cluster
//! handler. Production deployments would implement [`NodeSource`] against real membership
//! state; this crate ships [`StaticNodeSource`], a flat list loaded once from a JSON file.

use std::path::Path;

use crate::model::{Node, NodeRole};

pub trait NodeSource: Send + Sync {
    fn master_nodes(&self) -> Vec<Node>;
    fn agent_nodes(&self) -> Vec<Node>;

    fn all_nodes(&self) -> Vec<Node> {
        let mut nodes = self.master_nodes();
        nodes.extend(self.agent_nodes());
        nodes
    }
}

/// A node list read once at construction and held in memory for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct StaticNodeSource {
    nodes: Vec<Node>,
}

impl StaticNodeSource {
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read(path).await?;
        let nodes: Vec<Node> = serde_json::from_slice(&raw)?;
        Ok(Self { nodes })
    }
}

impl NodeSource for StaticNodeSource {
    fn master_nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .copied()
            .filter(|n| n.role == NodeRole::Master)
            .collect()
    }

    fn agent_nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .copied()
            .filter(|n| n.role == NodeRole::Agent)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(role: NodeRole, ip: &str) -> Node {
        Node {
            role,
            ip: ip.parse().unwrap(),
            leader: false,
        }
    }

    #[test]
    fn partitions_by_role() {
        let source = StaticNodeSource::from_nodes(vec![
            node(NodeRole::Master, "192.0.2.2"),
            node(NodeRole::Agent, "192.0.2.1"),
            node(NodeRole::Agent, "192.0.2.3"),
        ]);
        assert_eq!(source.master_nodes().len(), 1);
        assert_eq!(source.agent_nodes().len(), 2);
        assert_eq!(source.all_nodes().len(), 3);
    }

    #[tokio::test]
    async fn loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");
        tokio::fs::write(
            &path,
            r#"[{"role":"master","ip":"192.0.2.2","leader":true}]"#,
        )
        .await
        .unwrap();

        let source = StaticNodeSource::from_file(&path).await.unwrap();
        assert_eq!(source.master_nodes().len(), 1);
        assert!(source.master_nodes()[0].leader);
    }
}
