//! Integration tests for co-sim-io
//!
//! Each test runs two solvers on two threads with their own registry, the way
//! two processes would use the library.

use co_sim_io::{
    CoSimIo, ConnectionStatus, ErrorKind, Info, MemoryTransport, ModelPart, Node,
};
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

fn file_settings(dir: &Path, name: &str, solver: &str, partner: &str) -> Info {
    Info::new()
        .with("connection_name", name)
        .with("solver_name", solver)
        .with("connect_to", partner)
        .with("echo_level", 1)
        .with("working_directory", dir.to_string_lossy().into_owned())
        .with("timeout_ms", 10_000)
}

fn socket_settings(name: &str, solver: &str, partner: &str) -> Info {
    Info::new()
        .with("connection_name", name)
        .with("solver_name", solver)
        .with("connect_to", partner)
        .with("communication_format", "socket")
        .with("timeout_ms", 10_000)
}

fn exchange(name: &str, identifier: &str) -> Info {
    Info::new()
        .with("connection_name", name)
        .with("identifier", identifier)
}

fn interface_mesh() -> ModelPart {
    let mut model_part = ModelPart::new("interface").expect("Failed to create model part");
    model_part
        .create_new_node(2, 1.0, -2.7, 9.44)
        .expect("Failed to create node");
    model_part
        .create_new_node(159, -2.7, 9.44, 1.0)
        .expect("Failed to create node");
    model_part
        .create_new_node(61, 9.44, 1.0, -2.7)
        .expect("Failed to create node");
    model_part
        .create_new_element(15, 1, &[2])
        .expect("Failed to create element");
    model_part
}

/// Drive a full session: connect, data one way, mesh back, info, disconnect
fn run_session(fluid_settings: Info, structure_settings: Info, name: &'static str) {
    let (tx, rx) = mpsc::channel();

    let structure = thread::spawn(move || {
        let registry = CoSimIo::new();
        let connected = registry
            .connect(&structure_settings)
            .expect("Structure failed to connect");
        tx.send(ConnectionStatus::from_info(&connected).expect("Missing status"))
            .expect("Failed to report status");

        let (info, data) = registry
            .import_data(&exchange(name, "vector_of_pi"))
            .expect("Failed to import data");
        assert_eq!(info.get_int("size").expect("Missing size"), 4);

        registry
            .export_mesh(&exchange(name, "interface_mesh"), &interface_mesh())
            .expect("Failed to export mesh");

        let control = registry
            .import_info(&exchange(name, "control"))
            .expect("Failed to import info");

        let disconnected = registry
            .disconnect(&structure_settings)
            .expect("Structure failed to disconnect");
        (data, control, disconnected)
    });

    let registry = CoSimIo::new();
    let connected = registry
        .connect(&fluid_settings)
        .expect("Fluid failed to connect");
    assert_eq!(
        ConnectionStatus::from_info(&connected).expect("Missing status"),
        ConnectionStatus::Connected
    );
    assert_eq!(
        connected
            .get_string("partner_solver_name")
            .expect("Missing partner name"),
        "structure"
    );
    assert!(registry.is_connected(name));

    registry
        .export_data(&exchange(name, "vector_of_pi"), &[3.14; 4])
        .expect("Failed to export data");

    let (info, mesh) = registry
        .import_mesh(&exchange(name, "interface_mesh"))
        .expect("Failed to import mesh");
    assert_eq!(info.get_int("number_of_nodes").expect("Missing count"), 3);
    assert_eq!(mesh.number_of_nodes(), 3);
    assert_eq!(mesh.number_of_elements(), 1);
    let ids: Vec<_> = mesh.nodes().map(Node::id).collect();
    assert_eq!(ids, vec![2, 159, 61]);
    assert_eq!(
        mesh.get_node(159).expect("Missing node").coordinates(),
        [-2.7, 9.44, 1.0]
    );
    let element = mesh.get_element(15).expect("Missing element");
    assert_eq!(element.node_ids().collect::<Vec<_>>(), vec![2]);

    registry
        .export_info(
            &exchange(name, "control"),
            &Info::new().with("time", 0.5).with("converged", true),
        )
        .expect("Failed to export info");

    let disconnected = registry
        .disconnect(&fluid_settings)
        .expect("Fluid failed to disconnect");
    assert_eq!(
        ConnectionStatus::from_info(&disconnected).expect("Missing status"),
        ConnectionStatus::Disconnected
    );
    assert!(!registry.is_connected(name));

    let (data, control, structure_disconnected) =
        structure.join().expect("Structure thread panicked");
    assert_eq!(
        rx.recv().expect("Missing status"),
        ConnectionStatus::Connected
    );
    assert_eq!(data.len(), 4);
    assert!(data.iter().all(|value| *value == 3.14));
    assert_eq!(control.get_double("time").expect("Missing time"), 0.5);
    assert!(control.get_bool("converged").expect("Missing flag"));
    assert_eq!(
        ConnectionStatus::from_info(&structure_disconnected).expect("Missing status"),
        ConnectionStatus::Disconnected
    );
}

#[test]
fn test_file_session() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let name = "file_session";
    run_session(
        file_settings(dir.path(), name, "fluid", "structure"),
        file_settings(dir.path(), name, "structure", "fluid"),
        name,
    );
    assert!(!dir.path().join(".CoSimIOFileComm_file_session").exists());
}

#[test]
fn test_file_session_without_folder() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let name = "file_session_flat";
    run_session(
        file_settings(dir.path(), name, "fluid", "structure")
            .with("use_folder_for_communication", false),
        file_settings(dir.path(), name, "structure", "fluid")
            .with("use_folder_for_communication", false),
        name,
    );
    let leftovers = std::fs::read_dir(dir.path())
        .expect("Failed to list temp dir")
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_socket_session() {
    let name = "socket_session";
    run_session(
        socket_settings(name, "fluid", "structure"),
        socket_settings(name, "structure", "fluid"),
        name,
    );
}

#[test]
fn test_memory_ping_pong() {
    let name = "ping_pong";
    let settings = move |solver: &str| {
        Info::new()
            .with("connection_name", name)
            .with("solver_name", solver)
            .with("timeout_ms", 5_000)
    };
    let (a, b) = MemoryTransport::pair();
    let right = Arc::new(CoSimIo::new());

    let partner = {
        let right = Arc::clone(&right);
        let settings = settings("pong");
        thread::spawn(move || {
            right
                .connect_with_transport(&settings, Box::new(b))
                .expect("Failed to connect");
            for _ in 0..10 {
                let (_, mut data) = right
                    .import_data(&exchange(name, "ball"))
                    .expect("Failed to import");
                data.push(data.len() as f64);
                right
                    .export_data(&exchange(name, "ball"), &data)
                    .expect("Failed to export");
            }
            right.disconnect(&settings).expect("Failed to disconnect");
        })
    };

    let left = CoSimIo::new();
    left.connect_with_transport(&settings("ping"), Box::new(a))
        .expect("Failed to connect");
    let mut ball = Vec::new();
    for _ in 0..10 {
        left.export_data(&exchange(name, "ball"), &ball)
            .expect("Failed to export");
        let (_, data) = left
            .import_data(&exchange(name, "ball"))
            .expect("Failed to import");
        ball = data;
    }
    left.disconnect(&settings("ping"))
        .expect("Failed to disconnect");
    partner.join().expect("Partner thread panicked");

    assert_eq!(ball, (0..10).map(f64::from).collect::<Vec<_>>());
}

#[test]
fn test_exchange_outside_connection_is_illegal() {
    let settings = exchange("never_connected", "vector_of_pi");
    let err = co_sim_io::export_data(&settings, &[3.14; 4]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    let err = co_sim_io::import_mesh(&settings).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    let err = co_sim_io::disconnect(&settings).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert!(!co_sim_io::is_connected("never_connected"));
}

#[test]
fn test_global_registry_session() {
    let name = "global_session";
    let (a, b) = MemoryTransport::pair();
    let settings = move |solver: &str| {
        Info::new()
            .with("connection_name", name)
            .with("solver_name", solver)
    };

    // both sides share the global registry, so only one of them may register the name
    let partner = thread::spawn(move || {
        let registry = CoSimIo::new();
        registry
            .connect_with_transport(&settings("structure"), Box::new(b))
            .expect("Failed to connect");
        let (_, data) = registry
            .import_data(&exchange(name, "load"))
            .expect("Failed to import");
        registry
            .disconnect(&settings("structure"))
            .expect("Failed to disconnect");
        data
    });

    co_sim_io::connect_with_transport(&settings("fluid"), Box::new(a))
        .expect("Failed to connect");
    assert!(co_sim_io::is_connected(name));
    co_sim_io::export_data(&exchange(name, "load"), &[1.0, 2.0, 3.0])
        .expect("Failed to export");
    co_sim_io::disconnect(&settings("fluid")).expect("Failed to disconnect");
    assert!(!co_sim_io::is_connected(name));

    let err = co_sim_io::export_data(&exchange(name, "load"), &[1.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(
        partner.join().expect("Partner thread panicked"),
        vec![1.0, 2.0, 3.0]
    );
}

#[test]
fn test_mesh_summary() {
    let model_part = interface_mesh();
    assert_eq!(
        model_part.to_string(),
        "ModelPart \"interface\"\n    Number of Nodes: 3\n    Number of Elements: 1\n"
    );
}
