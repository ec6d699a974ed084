//! Integration tests exercising end-to-end publish/subscribe scenarios
//! against `dtl-sim`'s in-memory collaborators.

use std::sync::Arc;

use dtl_core::{Dtl, DtlError, EngineType, Mode, ReductionKind, TransportMethod};
use dtl_sim::{InMemoryFileSystem, InMemoryNetwork, VirtualClock};

fn backends() -> (Arc<VirtualClock>, Arc<InMemoryFileSystem>, Arc<InMemoryNetwork>) {
    (Arc::new(VirtualClock::new()), Arc::new(InMemoryFileSystem::new()), Arc::new(InMemoryNetwork::new()))
}

const TWO_STREAM_CONFIG: &str = r#"{
  "streams": [
    { "name": "Stream1", "engine": "File", "transport": "File" },
    { "name": "Stream2", "engine": "Staging", "transport": "MQ" }
  ]
}"#;

#[test]
fn s1_config_driven_open() {
    let dtl = Dtl::create(Some(TWO_STREAM_CONFIG)).unwrap();
    let (clock, fs, net) = backends();

    let stream1 = dtl.stream_by_name_or_null("Stream1").unwrap();
    assert_eq!(stream1.engine_type(), Some(EngineType::File));
    assert_eq!(stream1.transport_method(), Some(TransportMethod::File));
    assert!(stream1.metadata_export());

    let engine = stream1.open("root:fs:/scratch/file", Mode::Publish, "Pub", clock.clone(), fs.clone(), net.clone()).unwrap();
    assert_eq!(engine.mode(), Mode::Publish);

    stream1.unset_metadata_export();
    assert!(!stream1.metadata_export());
}

#[test]
fn s2_local_publish_single_and_repeated_transactions() {
    let dtl = Dtl::create(None).unwrap();
    let (clock, fs, net) = backends();
    let stream = dtl.add_stream("Stream1");
    stream.set_engine_type(EngineType::File).unwrap().set_transport_method(TransportMethod::File).unwrap();
    let var = stream.define_variable("Pub", "var", vec![20000, 20000], vec![0, 0], vec![20000, 20000], 8).unwrap();

    let mut engine = stream.open("root:fs:/scratch/file", Mode::Publish, "Pub", clock.clone(), fs.clone(), net.clone()).unwrap();
    clock.sleep_for(1.0);
    engine.begin_transaction().unwrap();
    engine.put(&var, None).unwrap();
    engine.end_transaction().unwrap();

    assert_eq!(fs.size("/scratch/file/data.0").unwrap(), 20000 * 20000 * 8);

    for _ in 0..4 {
        engine.begin_transaction().unwrap();
        engine.put(&var, None).unwrap();
        engine.end_transaction().unwrap();
    }
    assert_eq!(fs.size("/scratch/file/data.0").unwrap(), 5 * 20000 * 20000 * 8);
    engine.close().unwrap();
}

#[test]
fn s3_pub_sub_with_selection() {
    let dtl = Dtl::create(None).unwrap();
    let (clock, fs, net) = backends();
    let stream = dtl.add_stream("Stream1");
    stream.set_engine_type(EngineType::File).unwrap().set_transport_method(TransportMethod::File).unwrap();
    let var = stream.define_variable("Pub", "var", vec![20000, 20000], vec![0, 0], vec![20000, 20000], 8).unwrap();

    let mut publisher = stream.open("root:fs:/scratch/pfs", Mode::Publish, "Pub", clock.clone(), fs.clone(), net.clone()).unwrap();
    publisher.begin_transaction().unwrap();
    publisher.put(&var, None).unwrap();
    publisher.end_transaction().unwrap();
    publisher.close().unwrap();

    clock.sleep_until(10.0);

    let mut var_sub = stream.inquire_variable("var").unwrap();
    var_sub.set_selection(vec![10000, 0], vec![10000, 20000]).unwrap();
    assert_eq!(var_sub.local_size().unwrap(), 8 * 10000 * 20000);

    let mut subscriber = stream.open("root:fs:/scratch/pfs", Mode::Subscribe, "Sub", clock.clone(), fs.clone(), net.clone()).unwrap();
    subscriber.begin_transaction().unwrap();
    subscriber.get(&var_sub).unwrap();
    subscriber.end_transaction().unwrap();
    subscriber.close().unwrap();
}

#[test]
fn s4_multi_publisher_split_reassembles_whole_variable() {
    let dtl = Dtl::create(None).unwrap();
    let (clock, fs, net) = backends();
    let stream = dtl.add_stream("Stream1");
    stream.set_engine_type(EngineType::File).unwrap().set_transport_method(TransportMethod::File).unwrap();

    let var0 = stream.define_variable("Pub0", "var", vec![20000, 20000], vec![0, 0], vec![20000, 10000], 8).unwrap();
    let var1 = stream.define_variable("Pub1", "var", vec![20000, 20000], vec![0, 10000], vec![20000, 10000], 8).unwrap();

    let mut pub0 = stream.open("root:fs:/scratch/pfs", Mode::Publish, "Pub0", clock.clone(), fs.clone(), net.clone()).unwrap();
    pub0.begin_transaction().unwrap();
    pub0.put(&var0, None).unwrap();
    pub0.end_transaction().unwrap();
    pub0.close().unwrap();

    let mut pub1 = stream.open("root:fs:/scratch/pfs", Mode::Publish, "Pub1", clock.clone(), fs.clone(), net.clone()).unwrap();
    pub1.begin_transaction().unwrap();
    pub1.put(&var1, None).unwrap();
    pub1.end_transaction().unwrap();
    pub1.close().unwrap();

    let var_sub = stream.inquire_variable("var").unwrap();
    assert_eq!(var_sub.local_size().unwrap(), 8 * 20000 * 20000);

    let mut subscriber = stream.open("root:fs:/scratch/pfs", Mode::Subscribe, "Sub", clock.clone(), fs.clone(), net.clone()).unwrap();
    subscriber.begin_transaction().unwrap();
    subscriber.get(&var_sub).unwrap();
    subscriber.end_transaction().unwrap();
    subscriber.close().unwrap();
}

#[test]
fn s5_transaction_selection_over_repeated_publishes() {
    let dtl = Dtl::create(None).unwrap();
    let (clock, fs, net) = backends();
    let stream = dtl.add_stream("Stream1");
    stream.set_engine_type(EngineType::Staging).unwrap().set_transport_method(TransportMethod::Mailbox).unwrap();
    let var = stream.define_variable("Pub", "var", vec![20000, 20000], vec![0, 0], vec![20000, 20000], 8).unwrap();

    let mut publisher = stream.open("rendezvous", Mode::Publish, "Pub", clock.clone(), fs.clone(), net.clone()).unwrap();
    for _ in 0..5 {
        publisher.begin_transaction().unwrap();
        publisher.put(&var, None).unwrap();
        publisher.end_transaction().unwrap();
    }
    publisher.close().unwrap();

    clock.sleep_until(10.0);

    let total = stream.transaction_count("var", "Pub");
    assert_eq!(total, 5);

    let mut var_single = stream.inquire_variable("var").unwrap();
    var_single.set_transaction_selection_single(1, total).unwrap();
    assert_eq!(var_single.local_size().unwrap(), 1 * 8 * 20000 * 20000);

    let mut var_range = stream.inquire_variable("var").unwrap();
    var_range.set_transaction_selection_range(2, 2).unwrap();
    assert_eq!(var_range.local_size().unwrap(), 2 * 8 * 20000 * 20000);
}

#[test]
fn s6_decimation_reduces_shape_and_scales_flops() {
    let dtl = Dtl::create(None).unwrap();
    let stream = dtl.add_stream("Stream1");
    let mut var = stream.define_variable("Pub", "var", vec![640, 640, 640], vec![0, 0, 0], vec![640, 640, 640], 8).unwrap();

    let kind = stream.define_reduction_method("decimation").unwrap();
    assert_eq!(kind, ReductionKind::Decimation);
    assert!(dtl_core::ReductionMethod::reduced_global_shape(&var).is_err());

    let mut raw_params = std::collections::BTreeMap::new();
    raw_params.insert("stride".to_string(), "1,2,4".to_string());
    raw_params.insert("cost_per_element".to_string(), "3".to_string());
    stream.set_reduction_operation(&mut var, kind, &raw_params, true).unwrap();

    let shape = dtl_core::ReductionMethod::reduced_global_shape(&var).unwrap();
    assert_eq!(shape, vec![640, 320, 160]);
    assert_eq!(dtl_core::ReductionMethod::reduced_global_size(&var).unwrap(), var.global_size().unwrap() / 8);

    let flops = dtl_core::ReductionMethod::flops_to_reduce(&var).unwrap();
    assert_eq!(flops, 3.0 * (640 * 640 * 640) as f64);
}

#[test]
fn s7_sz_compresses_more_than_zfp_at_given_parameters() {
    let dtl = Dtl::create(None).unwrap();
    let stream = dtl.add_stream("Stream1");
    let mut var_sz = stream.define_variable("Pub", "var", vec![1000, 1000], vec![0, 0], vec![1000, 1000], 8).unwrap();
    let mut var_zfp = stream.define_variable("Pub", "var", vec![1000, 1000], vec![0, 0], vec![1000, 1000], 8).unwrap();

    assert_eq!(var_sz.global_size().unwrap(), 8_000_000);

    let kind = stream.define_reduction_method("compression").unwrap();
    let mut sz_params = std::collections::BTreeMap::new();
    sz_params.insert("compressor".to_string(), "sz".to_string());
    sz_params.insert("accuracy".to_string(), "1e-3".to_string());
    sz_params.insert("data_smoothness".to_string(), "0.5".to_string());
    stream.set_reduction_operation(&mut var_sz, kind, &sz_params, true).unwrap();

    let mut zfp_params = std::collections::BTreeMap::new();
    zfp_params.insert("compressor".to_string(), "zfp".to_string());
    zfp_params.insert("accuracy".to_string(), "1e-6".to_string());
    stream.set_reduction_operation(&mut var_zfp, kind, &zfp_params, true).unwrap();

    let sz_reduced = dtl_core::ReductionMethod::reduced_global_size(&var_sz).unwrap();
    let zfp_reduced = dtl_core::ReductionMethod::reduced_global_size(&var_zfp).unwrap();
    assert!(sz_reduced < 8_000_000);
    assert!(sz_reduced < zfp_reduced);
}

#[test]
fn s8_forbidden_double_reduction_and_subscriber_side_compression() {
    let dtl = Dtl::create(None).unwrap();
    let stream = dtl.add_stream("Stream1");
    let mut var = stream.define_variable("Pub", "var", vec![1000, 1000], vec![0, 0], vec![1000, 1000], 8).unwrap();

    let compression = stream.define_reduction_method("compression").unwrap();
    let mut params = std::collections::BTreeMap::new();
    params.insert("compression_ratio".to_string(), "4".to_string());
    stream.set_reduction_operation(&mut var, compression, &params, true).unwrap();

    let mut var_sub = stream.inquire_variable("var").unwrap();
    let decimation = stream.define_reduction_method("decimation").unwrap();
    let err = stream.set_reduction_operation(&mut var_sub, decimation, &std::collections::BTreeMap::new(), false).unwrap_err();
    assert!(matches!(err, DtlError::DoubleReduction));

    let mut fresh_sub = stream.inquire_variable("var").unwrap();
    let err2 = stream.set_reduction_operation(&mut fresh_sub, compression, &params, false).unwrap_err();
    assert!(matches!(err2, DtlError::SubscriberSideCompression));
}
