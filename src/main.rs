//! Demo binary wiring `dtl-core`'s stream/engine machinery to `dtl-sim`'s
//! in-memory collaborators, walking through a config-driven publish and a
//! selection-restricted subscribe.

use std::sync::Arc;

use dtl_core::{Dtl, Mode};
use dtl_sim::{InMemoryFileSystem, InMemoryNetwork, VirtualClock};

const CONFIG: &str = r#"{
  "streams": [
    { "name": "Stream1", "engine": "File", "transport": "File" },
    { "name": "Stream2", "engine": "Staging", "transport": "MQ" }
  ]
}"#;

fn main() {
    env_logger::init();
    let dtl = Dtl::create(Some(CONFIG)).expect("config is well-formed");
    let clock = Arc::new(VirtualClock::new());
    let fs = Arc::new(InMemoryFileSystem::new());
    let net = Arc::new(InMemoryNetwork::new());

    dtl.connect("PubActor").unwrap();
    dtl.connect("SubActor").unwrap();

    let pub_stream = dtl.stream_by_name_or_null("Stream1").expect("Stream1 preset from config");
    println!(
        "Stream1: engine={:?} transport={:?} metadata_export={}",
        pub_stream.engine_type(),
        pub_stream.transport_method(),
        pub_stream.metadata_export()
    );

    let var = pub_stream.define_variable("PubActor", "temperature", vec![20000, 20000], vec![0, 0], vec![20000, 20000], 8).unwrap();

    let mut publisher = pub_stream
        .open("root:fs:/scratch/file", Mode::Publish, "PubActor", clock.clone(), fs.clone(), net.clone())
        .unwrap();
    clock.sleep_for(1.0);
    publisher.begin_transaction().unwrap();
    publisher.put(&var, None).unwrap();
    publisher.end_transaction().unwrap();
    publisher.close().unwrap();
    println!("publisher done at simulated t={:.6}s", clock.now());

    let mut var_sub = pub_stream.inquire_variable("temperature").unwrap();
    var_sub.set_selection(vec![10000, 0], vec![10000, 20000]).unwrap();

    let mut subscriber = pub_stream
        .open("root:fs:/scratch/file", Mode::Subscribe, "SubActor", clock.clone(), fs.clone(), net.clone())
        .unwrap();
    subscriber.begin_transaction().unwrap();
    subscriber.get(&var_sub).unwrap();
    subscriber.end_transaction().unwrap();
    subscriber.close().unwrap();

    println!("subscriber local_size={} bytes, finished at t={:.6}s", var_sub.local_size().unwrap(), clock.now());

    dtl.disconnect("PubActor").unwrap();
    dtl.disconnect("SubActor").unwrap();
}
