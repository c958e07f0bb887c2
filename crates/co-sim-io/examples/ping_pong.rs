//! Two solvers coupled through the file transport
//!
//! A "fluid" solver sends interface loads, a "structure" solver answers with
//! displacements, for a few coupling iterations.

use co_sim_io::{CoSimIo, ConnectionStatus, Info, ModelPart};
use std::path::Path;
use std::thread;

const ITERATIONS: usize = 3;

fn settings(dir: &Path, solver: &str, partner: &str) -> Info {
    Info::new()
        .with("connection_name", "ping_pong")
        .with("solver_name", solver)
        .with("connect_to", partner)
        .with("echo_level", 1)
        .with("working_directory", dir.to_string_lossy().into_owned())
}

fn exchange(identifier: &str) -> Info {
    Info::new()
        .with("connection_name", "ping_pong")
        .with("identifier", identifier)
}

fn run_structure(settings: Info) -> co_sim_io::Result<()> {
    let registry = CoSimIo::new();
    registry.connect(&settings)?;

    let (_, mesh) = registry.import_mesh(&exchange("interface"))?;
    println!("Structure received:\n{mesh}");

    for _ in 0..ITERATIONS {
        let (_, loads) = registry.import_data(&exchange("loads"))?;
        let displacements: Vec<f64> = loads.iter().map(|load| load * 1e-3).collect();
        registry.export_data(&exchange("displacements"), &displacements)?;
    }

    registry.disconnect(&settings)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let dir = tempfile::tempdir()?;
    let structure_settings = settings(dir.path(), "structure", "fluid");
    let structure = thread::spawn(move || run_structure(structure_settings));

    let fluid_settings = settings(dir.path(), "fluid", "structure");
    let registry = CoSimIo::new();
    let info = registry.connect(&fluid_settings)?;
    println!(
        "Fluid connected: {:?}",
        ConnectionStatus::from_info(&info)?
    );

    let mut interface = ModelPart::new("interface")?;
    interface.create_new_node(1, 0.0, 0.0, 0.0)?;
    interface.create_new_node(2, 1.0, 0.0, 0.0)?;
    interface.create_new_node(3, 0.0, 1.0, 0.0)?;
    interface.create_new_element(1, 5, &[1, 2, 3])?;
    registry.export_mesh(&exchange("interface"), &interface)?;

    let mut loads = vec![100.0; interface.number_of_nodes()];
    for iteration in 0..ITERATIONS {
        registry.export_data(&exchange("loads"), &loads)?;
        let (_, displacements) = registry.import_data(&exchange("displacements"))?;
        println!("Iteration {iteration}: displacements {displacements:?}");
        loads.iter_mut().for_each(|load| *load *= 0.5);
    }

    let info = registry.disconnect(&fluid_settings)?;
    println!(
        "Fluid disconnected: {:?}",
        ConnectionStatus::from_info(&info)?
    );

    structure
        .join()
        .map_err(|_| "structure thread panicked")??;

    println!("Coupling completed successfully!");
    Ok(())
}
