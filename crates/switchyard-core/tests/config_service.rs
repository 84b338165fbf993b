// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use switchyard_core::{BusConfig, ConfigError, ConfigService, Registrar};
use switchyard_dry_tests::{InMemoryConfigStore, MemorySink};

#[test]
fn registrar_picks_up_stored_settings() {
    let store = InMemoryConfigStore::with_json("bus", r#"{"debug": true, "trace_publishers": false}"#);
    let service = ConfigService::new(store.clone());
    let config: BusConfig = service.load_settings().unwrap();
    assert_eq!(store.load_count(), 1);

    let reg = Registrar::with_config("loaded", config);
    let sink = MemorySink::new();
    reg.set_sink(sink.shared());
    let traced = std::rc::Rc::new(std::cell::Cell::new(0));
    let t = std::rc::Rc::clone(&traced);
    reg.trace(move |_, _, _| t.set(t.get() + 1));

    let ping = reg.publish::<(u8,), ()>("ping", "me").unwrap();
    assert!(ping.debug());
    assert_eq!(traced.get(), 0, "publishers are not traced");
    ping.emit((9,));
    assert_eq!(sink.take(), vec!["me -> loaded.ping(9)".to_owned()]);
}

#[test]
fn missing_keys_fall_back_to_defaults() {
    let store = InMemoryConfigStore::new();
    let service = ConfigService::new(store);
    assert_eq!(service.load::<BusConfig>("bus").unwrap(), None);
    assert_eq!(
        service.load_settings::<BusConfig>().unwrap(),
        BusConfig::default()
    );
}

#[test]
fn saved_settings_round_trip_and_failures_surface() {
    let store = InMemoryConfigStore::new();
    let service = ConfigService::new(store.clone());
    let config = BusConfig {
        debug: true,
        ..BusConfig::default()
    };
    service.save("bus", &config).unwrap();
    assert!(store.text("bus").unwrap().contains("\"debug\": true"));
    assert_eq!(service.load::<BusConfig>("bus").unwrap(), Some(config));

    store.set_fail_on_load(true);
    assert!(matches!(
        service.load::<BusConfig>("bus"),
        Err(ConfigError::Other(_))
    ));

    let corrupt = ConfigService::new(InMemoryConfigStore::with_json("bus", "{not json"));
    assert!(matches!(
        corrupt.load::<BusConfig>("bus"),
        Err(ConfigError::Serde(_))
    ));
}

#[test]
fn set_config_affects_channels_created_afterwards() {
    let reg = Registrar::new("live");
    let before = reg.publish::<(), ()>("before", "").unwrap();
    reg.set_config(BusConfig {
        debug: true,
        trace_publishers: true,
    });
    let after = reg.publish::<(), ()>("after", "").unwrap();
    assert!(!before.debug());
    assert!(after.debug());
    reg.set_debug(false);
    assert!(!after.debug());
}
