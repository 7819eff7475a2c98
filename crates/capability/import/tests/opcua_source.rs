use async_trait::async_trait;
use dms_import::{
    BrowsedNode, ImportError, ImportSource, OpcUaBrowseSource, OpcUaBrowser, parse_browse_dump,
};
use domain::{OpcUaUpdateMode, ProtocolType};
use std::sync::Arc;

struct FixedBrowser {
    nodes: Vec<BrowsedNode>,
}

#[async_trait]
impl OpcUaBrowser for FixedBrowser {
    async fn browse(&self, endpoint_url: &str) -> Result<Vec<BrowsedNode>, ImportError> {
        assert_eq!(endpoint_url, "opc.tcp://127.0.0.1:4840");
        Ok(self.nodes.clone())
    }
}

struct OfflineBrowser;

#[async_trait]
impl OpcUaBrowser for OfflineBrowser {
    async fn browse(&self, _endpoint_url: &str) -> Result<Vec<BrowsedNode>, ImportError> {
        Err(ImportError::Browse("connection refused".to_string()))
    }
}

fn node(name: &str, node_id: &str, node_class: &str) -> BrowsedNode {
    BrowsedNode {
        name: name.to_string(),
        node_id: node_id.to_string(),
        node_class: node_class.to_string(),
        data_type: "Double".to_string(),
        description: String::new(),
    }
}

#[tokio::test]
async fn live_browse_keeps_variable_nodes() {
    let browser = Arc::new(FixedBrowser {
        nodes: vec![
            node("Line1", "ns=2;s=Line1", "Object"),
            node("Speed", "ns=2;s=Line1.Speed", "Variable"),
            node("Torque", "ns=2;s=Line1.Torque", ""),
            node("Broken", "  ", "Variable"),
        ],
    });
    let source = OpcUaBrowseSource::live(browser, "opc.tcp://127.0.0.1:4840");
    assert_eq!(source.source_protocol(), Some(ProtocolType::OpcUa));

    let records = source.fetch().await.expect("fetch");
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Speed", "Torque"]);
    assert!(records.iter().all(|r| r.protocol == ProtocolType::OpcUa));
    assert_eq!(records[0].update_mode, Some(OpcUaUpdateMode::Subscription));
}

#[tokio::test]
async fn update_mode_can_be_overridden() {
    let browser = Arc::new(FixedBrowser {
        nodes: vec![node("Speed", "ns=2;s=Line1.Speed", "Variable")],
    });
    let source = OpcUaBrowseSource::live(browser, "opc.tcp://127.0.0.1:4840")
        .with_update_mode(OpcUaUpdateMode::Poll);
    let records = source.fetch().await.expect("fetch");
    assert_eq!(records[0].update_mode, Some(OpcUaUpdateMode::Poll));
}

#[tokio::test]
async fn browse_failure_is_reported() {
    let source = OpcUaBrowseSource::live(Arc::new(OfflineBrowser), "opc.tcp://127.0.0.1:4840");
    let err = source.fetch().await.expect_err("offline");
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn reads_browse_dump_file() {
    let path = std::env::temp_dir().join(format!("dms-browse-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"[
            {"displayName": "Speed", "nodeId": "ns=2;s=Line1.Speed", "nodeClass": "Variable", "dataType": "Double"},
            {"browseName": "Folder", "node_id": "ns=2;s=Folder", "node_class": "Object"}
        ]"#,
    )
    .expect("write dump");
    let source = OpcUaBrowseSource::from_dump(path.clone());
    let records = source.fetch().await.expect("fetch");
    std::fs::remove_file(&path).ok();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].address, "ns=2;s=Line1.Speed");
    assert_eq!(records[0].data_type, "Double");
}

#[test]
fn malformed_dump_is_rejected() {
    assert!(matches!(
        parse_browse_dump("{not json"),
        Err(ImportError::Dump(_))
    ));
}

#[test]
fn dump_with_display_and_browse_names_prefers_display_name() {
    let nodes = parse_browse_dump(
        r#"[
            {"displayName": "Speed", "browseName": "2:Speed_Raw", "nodeId": "ns=2;s=Line1.Speed"},
            {"name": "Torque", "displayName": "Motor torque", "nodeId": "ns=2;s=Line1.Torque"},
            {"browseName": "Temp", "nodeId": "ns=2;s=Line1.Temp"}
        ]"#,
    )
    .expect("parse");
    let names: Vec<&str> = nodes.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, vec!["Speed", "Torque", "Temp"]);
}

#[test]
fn dump_node_without_any_name_is_rejected() {
    assert!(matches!(
        parse_browse_dump(r#"[{"nodeId": "ns=2;s=Anonymous"}]"#),
        Err(ImportError::Dump(_))
    ));
}
