//! Runs the Meraki provider through ProviderServer against a mock Dashboard
//! API: plan, apply, refresh, import and data source reads

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use meraki::catalog;
use meraki::endpoint::ResourceDescriptor;
use meraki::MerakiProvider;
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tfplug::data_source::ReadDataSourceRequest;
use tfplug::provider::ConfigureProviderRequest;
use tfplug::resource::{
    ImportResourceStateRequest, ReadResourceRequest, ValidateResourceConfigRequest,
};
use tfplug::server::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, PlanResourceChangeRequest,
    PlanResourceChangeResponse,
};
use tfplug::types::{has_errors, AttributePath};
use tfplug::{Context, Dynamic, DynamicValue, FieldMode, ProviderServer};

fn value(json: Value) -> DynamicValue {
    DynamicValue::decode_json(json.to_string().as_bytes()).unwrap()
}

/// Configuration as Terraform sends it: every attribute present, unset ones null
fn config(descriptor: &ResourceDescriptor, json: Value) -> DynamicValue {
    let mut config = value(json).value;
    if let Dynamic::Map(fields) = &mut config {
        for attr in descriptor.attributes {
            fields
                .entry(attr.name.to_string())
                .or_insert(Dynamic::Null);
        }
    }
    DynamicValue::new(config)
}

/// Terraform's proposed new state: the config, with computed attributes the
/// config leaves null carried over from prior state
fn propose(
    descriptor: &ResourceDescriptor,
    prior: &DynamicValue,
    config: &DynamicValue,
) -> DynamicValue {
    let mut proposed = config.value.clone();
    if let Dynamic::Map(fields) = &mut proposed {
        for attr in descriptor.attributes {
            let computed = matches!(attr.mode, FieldMode::Computed | FieldMode::OptionalComputed);
            let unset = fields.get(attr.name).map_or(true, Dynamic::is_null);
            if let Some(prior_value) = prior.value.get(attr.name).filter(|_| computed && unset) {
                fields.insert(attr.name.to_string(), prior_value.clone());
            }
        }
    }
    DynamicValue::new(proposed)
}

async fn configured_server(url: &str) -> ProviderServer<MerakiProvider> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let server = ProviderServer::new(MerakiProvider::new());
    let diagnostics = server
        .configure_provider(
            Context::new(),
            ConfigureProviderRequest {
                terraform_version: "1.9.0".to_string(),
                config: value(json!({
                    "meraki_dashboard_api_key": "test-key",
                    "meraki_base_url": url,
                    "meraki_requests_per_second": 0
                })),
            },
        )
        .await;
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    server
}

async fn plan(
    server: &ProviderServer<MerakiProvider>,
    descriptor: &ResourceDescriptor,
    prior: &DynamicValue,
    config: &DynamicValue,
) -> PlanResourceChangeResponse {
    let response = server
        .plan_resource_change(
            Context::new(),
            PlanResourceChangeRequest {
                type_name: descriptor.type_name.to_string(),
                prior_state: prior.clone(),
                proposed_new_state: propose(descriptor, prior, config),
                config: config.clone(),
            },
        )
        .await;
    assert!(!has_errors(&response.diagnostics), "{:?}", response.diagnostics);
    response
}

async fn apply(
    server: &ProviderServer<MerakiProvider>,
    descriptor: &ResourceDescriptor,
    prior: &DynamicValue,
    planned: DynamicValue,
    config: &DynamicValue,
) -> ApplyResourceChangeResponse {
    server
        .apply_resource_change(
            Context::new(),
            ApplyResourceChangeRequest {
                type_name: descriptor.type_name.to_string(),
                prior_state: prior.clone(),
                planned_state: planned,
                config: config.clone(),
            },
        )
        .await
}

async fn refresh(
    server: &ProviderServer<MerakiProvider>,
    descriptor: &ResourceDescriptor,
    state: &DynamicValue,
) -> Option<DynamicValue> {
    let response = server
        .read_resource(
            Context::new(),
            ReadResourceRequest {
                type_name: descriptor.type_name.to_string(),
                current_state: state.clone(),
            },
        )
        .await;
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    response.new_state
}

fn network_body(name: &str) -> Value {
    json!({
        "id": "N_1",
        "organizationId": "O_1",
        "name": name,
        "productTypes": ["appliance", "wireless"],
        "timeZone": "America/Los_Angeles",
        "tags": ["prod"],
        "url": "https://n1.meraki.com/HQ/n/abc/manage/usage/list",
        "isBoundToConfigTemplate": false
    })
}

#[tokio::test]
async fn network_lifecycle() {
    let mut api = Server::new_async().await;
    let server = configured_server(&api.url()).await;
    let descriptor = &catalog::NETWORK;

    let create = api
        .mock("POST", "/api/v1/organizations/O_1/networks")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::Json(json!({
            "name": "HQ",
            "productTypes": ["appliance", "wireless"],
            "tags": ["prod"]
        })))
        .with_status(201)
        .with_body(network_body("HQ").to_string())
        .create_async()
        .await;

    let hq = config(
        descriptor,
        json!({
            "organization_id": "O_1",
            "name": "HQ",
            "product_types": ["appliance", "wireless"],
            "tags": ["prod"]
        }),
    );

    let planned = plan(&server, descriptor, &DynamicValue::null(), &hq).await;
    assert!(planned.planned_state.value.get("network_id").unwrap().is_unknown());
    assert!(planned.planned_state.value.get("time_zone").unwrap().is_unknown());

    let created = apply(&server, descriptor, &DynamicValue::null(), planned.planned_state, &hq).await;
    create.assert_async().await;
    assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);

    let state = created.new_state;
    assert_eq!(state.value.get("network_id"), Some(&Dynamic::from("N_1")));
    assert_eq!(
        state.value.get("time_zone"),
        Some(&Dynamic::from("America/Los_Angeles"))
    );
    assert_eq!(state.value.get("notes"), Some(&Dynamic::Null));

    // refresh against an unchanged network keeps the state as is
    let read = api
        .mock("GET", "/api/v1/networks/N_1")
        .with_status(200)
        .with_body(network_body("HQ").to_string())
        .create_async()
        .await;
    let refreshed = refresh(&server, descriptor, &state).await.unwrap();
    read.assert_async().await;
    assert_eq!(refreshed, state);

    let noop = plan(&server, descriptor, &state, &hq).await;
    assert_eq!(noop.planned_state, state);
    assert!(noop.requires_replace.is_empty());

    // rename in place; replace-only and path attributes stay out of the body
    let update = api
        .mock("PUT", "/api/v1/networks/N_1")
        .match_body(Matcher::Json(json!({"name": "HQ2", "tags": ["prod"]})))
        .with_status(200)
        .with_body(network_body("HQ2").to_string())
        .create_async()
        .await;

    let hq2 = config(
        descriptor,
        json!({
            "organization_id": "O_1",
            "name": "HQ2",
            "product_types": ["appliance", "wireless"],
            "tags": ["prod"]
        }),
    );
    let planned = plan(&server, descriptor, &state, &hq2).await;
    assert!(planned.requires_replace.is_empty());
    assert_eq!(
        planned.planned_state.value.get("network_id"),
        Some(&Dynamic::from("N_1"))
    );

    let updated = apply(&server, descriptor, &state, planned.planned_state, &hq2).await;
    update.assert_async().await;
    assert!(updated.diagnostics.is_empty(), "{:?}", updated.diagnostics);
    assert_eq!(updated.new_state.value.get("name"), Some(&Dynamic::from("HQ2")));
    assert_eq!(
        updated.new_state.value.get("time_zone"),
        Some(&Dynamic::from("America/Los_Angeles"))
    );

    let delete = api
        .mock("DELETE", "/api/v1/networks/N_1")
        .with_status(204)
        .create_async()
        .await;
    let planned = plan(&server, descriptor, &updated.new_state, &DynamicValue::null()).await;
    assert!(planned.planned_state.is_null());

    let destroyed = apply(
        &server,
        descriptor,
        &updated.new_state,
        planned.planned_state,
        &DynamicValue::null(),
    )
    .await;
    delete.assert_async().await;
    assert!(destroyed.diagnostics.is_empty());
    assert!(destroyed.new_state.is_null());
}

#[tokio::test]
async fn moving_a_network_between_organizations_requires_replace() {
    let api = Server::new_async().await;
    let server = configured_server(&api.url()).await;
    let descriptor = &catalog::NETWORK;

    let state = value(json!({
        "network_id": "N_1",
        "organization_id": "O_1",
        "name": "HQ",
        "product_types": ["appliance"],
        "time_zone": "America/Los_Angeles",
        "tags": null,
        "notes": null,
        "enrollment_string": null,
        "url": "https://n1.meraki.com/HQ",
        "is_bound_to_config_template": false
    }));

    let moved = config(
        descriptor,
        json!({
            "organization_id": "O_2",
            "name": "HQ",
            "product_types": ["appliance"]
        }),
    );
    let planned = plan(&server, descriptor, &state, &moved).await;

    assert_eq!(
        planned.planned_state.value.get("network_id"),
        Some(&Dynamic::from("N_1"))
    );
    assert_eq!(
        planned.requires_replace,
        vec![AttributePath::new("organization_id")]
    );
}

#[tokio::test]
async fn ssid_keeps_write_only_psk() {
    let mut api = Server::new_async().await;
    let server = configured_server(&api.url()).await;
    let descriptor = &catalog::WIRELESS_SSID;

    let ssid = json!({
        "number": 3,
        "name": "Guest",
        "enabled": true,
        "authMode": "psk",
        "encryptionMode": "wpa",
        "wpaEncryptionMode": "WPA2 only",
        "ipAssignmentMode": "NAT mode",
        "minBitrate": 11,
        "bandSelection": "Dual band operation",
        "perClientBandwidthLimitUp": 0,
        "perClientBandwidthLimitDown": 0,
        "visible": true,
        "availableOnAllAps": true,
        "availabilityTags": [],
        "splashPage": "None"
    });

    let put = api
        .mock("PUT", "/api/v1/networks/N_1/wireless/ssids/3")
        .match_body(Matcher::Json(json!({
            "name": "Guest",
            "authMode": "psk",
            "encryptionMode": "wpa",
            "psk": "secret123"
        })))
        .with_status(200)
        .with_body(ssid.to_string())
        .create_async()
        .await;

    let guest = config(
        descriptor,
        json!({
            "network_id": "N_1",
            "number": 3,
            "name": "Guest",
            "auth_mode": "psk",
            "encryption_mode": "wpa",
            "psk": "secret123"
        }),
    );

    let planned = plan(&server, descriptor, &DynamicValue::null(), &guest).await;
    let created = apply(&server, descriptor, &DynamicValue::null(), planned.planned_state, &guest).await;
    put.assert_async().await;
    assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);

    let state = created.new_state;
    assert_eq!(state.value.get("psk"), Some(&Dynamic::from("secret123")));
    assert_eq!(state.value.get("enabled"), Some(&Dynamic::Bool(true)));
    assert_eq!(state.value.get("min_bitrate"), Some(&Dynamic::Number(11.0)));
    assert_eq!(state.value.get("default_vlan_id"), Some(&Dynamic::Null));

    // the SSID was disabled in Dashboard; the API never returns the psk
    let mut disabled = ssid.clone();
    disabled["enabled"] = json!(false);
    let get = api
        .mock("GET", "/api/v1/networks/N_1/wireless/ssids/3")
        .with_status(200)
        .with_body(disabled.to_string())
        .create_async()
        .await;

    let refreshed = refresh(&server, descriptor, &state).await.unwrap();
    get.assert_async().await;
    assert_eq!(refreshed.value.get("psk"), Some(&Dynamic::from("secret123")));
    assert_eq!(refreshed.value.get("enabled"), Some(&Dynamic::Bool(false)));
    assert_eq!(refreshed.value.get("network_id"), Some(&Dynamic::from("N_1")));

    // settings cannot be deleted; destroy only forgets them
    let destroyed = apply(
        &server,
        descriptor,
        &refreshed,
        DynamicValue::null(),
        &DynamicValue::null(),
    )
    .await;
    assert!(destroyed.new_state.is_null());
    assert_eq!(destroyed.diagnostics.len(), 1);
    assert!(!destroyed.diagnostics[0].is_error());
}

#[tokio::test]
async fn radius_server_ids_are_known_after_apply() {
    let mut api = Server::new_async().await;
    let server = configured_server(&api.url()).await;
    let descriptor = &catalog::WIRELESS_SSID;

    let put = api
        .mock("PUT", "/api/v1/networks/N_1/wireless/ssids/1")
        .match_body(Matcher::Json(json!({
            "name": "Corp",
            "authMode": "8021x-radius",
            "radiusServers": [{"host": "10.0.0.2", "secret": "s3"}]
        })))
        .with_status(200)
        .with_body(
            json!({
                "number": 1,
                "name": "Corp",
                "authMode": "8021x-radius",
                "radiusServers": [{"id": "rs1", "host": "10.0.0.2", "port": 1812}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let corp = config(
        descriptor,
        json!({
            "network_id": "N_1",
            "number": 1,
            "name": "Corp",
            "auth_mode": "8021x-radius",
            "radius_servers": [{"id": null, "host": "10.0.0.2", "port": null, "secret": "s3"}]
        }),
    );

    let planned = plan(&server, descriptor, &DynamicValue::null(), &corp).await;
    let planned_server = planned
        .planned_state
        .value
        .get("radius_servers")
        .and_then(Dynamic::as_list)
        .map(|servers| servers[0].clone())
        .unwrap();
    assert!(planned_server.get("id").unwrap().is_unknown());
    assert!(planned_server.get("port").unwrap().is_unknown());
    assert_eq!(planned_server.get("host"), Some(&Dynamic::from("10.0.0.2")));

    let created = apply(&server, descriptor, &DynamicValue::null(), planned.planned_state, &corp).await;
    put.assert_async().await;
    assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);

    let servers = created
        .new_state
        .value
        .get("radius_servers")
        .and_then(Dynamic::as_list)
        .unwrap();
    assert_eq!(servers[0].get("id"), Some(&Dynamic::from("rs1")));
    assert_eq!(servers[0].get("port"), Some(&Dynamic::Number(1812.0)));
    assert_eq!(servers[0].get("secret"), Some(&Dynamic::from("s3")));
}

#[tokio::test]
async fn failed_create_commits_no_state() {
    let mut api = Server::new_async().await;
    let server = configured_server(&api.url()).await;
    let descriptor = &catalog::APPLIANCE_VLAN;

    api.mock("POST", "/api/v1/networks/N_1/appliance/vlans")
        .with_status(400)
        .with_body(r#"{"errors":["VLAN ID is already in use"]}"#)
        .create_async()
        .await;

    let vlan = config(
        descriptor,
        json!({"network_id": "N_1", "vlan_id": "10", "name": "Cameras"}),
    );
    let planned = plan(&server, descriptor, &DynamicValue::null(), &vlan).await;
    let response = apply(&server, descriptor, &DynamicValue::null(), planned.planned_state, &vlan).await;

    assert!(response.new_state.is_null());
    assert_eq!(
        response.diagnostics[0].summary,
        "Failed to create meraki_networks_appliance_vlans"
    );
    assert!(response.diagnostics[0]
        .detail
        .contains("VLAN ID is already in use"));
}

#[tokio::test]
async fn vlan_reservations_round_trip_as_map() {
    let mut api = Server::new_async().await;
    let server = configured_server(&api.url()).await;
    let descriptor = &catalog::APPLIANCE_VLAN;

    let reservations = json!({
        "22:33:44:55:66:77": {"ip": "192.168.10.5", "name": "Cam 1"}
    });
    let create = api
        .mock("POST", "/api/v1/networks/N_1/appliance/vlans")
        .match_body(Matcher::Json(json!({
            "id": "10",
            "name": "Cameras",
            "subnet": "192.168.10.0/24",
            "applianceIp": "192.168.10.1",
            "fixedIpAssignments": reservations
        })))
        .with_status(201)
        .with_body(
            json!({
                "id": 10,
                "networkId": "N_1",
                "name": "Cameras",
                "subnet": "192.168.10.0/24",
                "applianceIp": "192.168.10.1",
                "interfaceId": "1284392014819",
                "dhcpHandling": "Run a DHCP server",
                "dhcpLeaseTime": "1 day",
                "dnsNameservers": "upstream_dns",
                "fixedIpAssignments": reservations
            })
            .to_string(),
        )
        .create_async()
        .await;

    let vlan = config(
        descriptor,
        json!({
            "network_id": "N_1",
            "vlan_id": "10",
            "name": "Cameras",
            "subnet": "192.168.10.0/24",
            "appliance_ip": "192.168.10.1",
            "fixed_ip_assignments": reservations
        }),
    );
    let planned = plan(&server, descriptor, &DynamicValue::null(), &vlan).await;
    let created = apply(&server, descriptor, &DynamicValue::null(), planned.planned_state, &vlan).await;
    create.assert_async().await;
    assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);

    let state = created.new_state.value;
    assert_eq!(state.get("vlan_id"), Some(&Dynamic::from("10")));
    assert_eq!(state.get("interface_id"), Some(&Dynamic::from("1284392014819")));
    assert_eq!(state.get("mask"), Some(&Dynamic::Null));

    let reservation = state
        .get("fixed_ip_assignments")
        .and_then(|m| m.get("22:33:44:55:66:77"))
        .unwrap();
    assert_eq!(reservation.get("ip"), Some(&Dynamic::from("192.168.10.5")));
}

#[tokio::test]
async fn deleted_network_is_removed_on_refresh() {
    let mut api = Server::new_async().await;
    let server = configured_server(&api.url()).await;

    api.mock("GET", "/api/v1/networks/N_9")
        .with_status(404)
        .with_body(r#"{"errors":["Not found"]}"#)
        .create_async()
        .await;

    let state = config(&catalog::NETWORK, json!({"network_id": "N_9", "name": "Gone"}));
    let refreshed = refresh(&server, &catalog::NETWORK, &state).await;

    assert!(refreshed.is_none());
}

#[tokio::test]
async fn imported_firewall_rules_skip_default_rule() {
    let mut api = Server::new_async().await;
    let server = configured_server(&api.url()).await;
    let descriptor = &catalog::L3_FIREWALL_RULES;

    api.mock(
        "GET",
        "/api/v1/networks/N_1/appliance/firewall/l3FirewallRules",
    )
    .with_status(200)
    .with_body(
        json!({
            "rules": [
                {
                    "comment": "Allow DNS",
                    "policy": "allow",
                    "protocol": "udp",
                    "srcPort": "Any",
                    "srcCidr": "Any",
                    "destPort": "53",
                    "destCidr": "Any",
                    "syslogEnabled": false
                },
                {
                    "comment": "Default rule",
                    "policy": "allow",
                    "protocol": "Any",
                    "srcPort": "Any",
                    "srcCidr": "Any",
                    "destPort": "Any",
                    "destCidr": "Any",
                    "syslogEnabled": false
                }
            ],
            "syslogDefaultRule": false
        })
        .to_string(),
    )
    .create_async()
    .await;

    let imported = server
        .import_resource_state(
            Context::new(),
            ImportResourceStateRequest {
                type_name: descriptor.type_name.to_string(),
                id: "N_1".to_string(),
            },
        )
        .await;
    assert!(imported.diagnostics.is_empty(), "{:?}", imported.diagnostics);

    let state = refresh(&server, descriptor, &imported.imported_resources[0].state)
        .await
        .unwrap();

    assert_eq!(state.value.get("network_id"), Some(&Dynamic::from("N_1")));
    let rules = state.value.get("rules").and_then(Dynamic::as_list).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].get("dest_port"), Some(&Dynamic::from("53")));
}

#[tokio::test]
async fn invalid_auth_mode_fails_validation() {
    let api = Server::new_async().await;
    let server = configured_server(&api.url()).await;
    let descriptor = &catalog::WIRELESS_SSID;

    let response = server
        .validate_resource_config(
            Context::new(),
            ValidateResourceConfigRequest {
                type_name: descriptor.type_name.to_string(),
                config: config(
                    descriptor,
                    json!({
                        "network_id": "N_1",
                        "number": 0,
                        "name": "Corp",
                        "auth_mode": "wpa3"
                    }),
                ),
            },
        )
        .await;

    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(
        response.diagnostics[0].attribute,
        Some(AttributePath::new("auth_mode"))
    );
}

#[tokio::test]
async fn organizations_data_source_lists_nested_objects() {
    let mut api = Server::new_async().await;
    let server = configured_server(&api.url()).await;

    let list = api
        .mock("GET", "/api/v1/organizations")
        .with_status(200)
        .with_body(
            json!([{
                "id": "O_1",
                "name": "Acme",
                "url": "https://n1.meraki.com/o/abc/manage/organization/overview",
                "api": {"enabled": true},
                "licensing": {"model": "co-term"},
                "cloud": {"region": {"name": "North America"}},
                "management": {"details": []}
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let response = server
        .read_data_source(
            Context::new(),
            ReadDataSourceRequest {
                type_name: "meraki_organizations".to_string(),
                config: value(json!({"organization_id": null})),
            },
        )
        .await;
    list.assert_async().await;
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);

    let items = response
        .state
        .value
        .get("items")
        .and_then(Dynamic::as_list)
        .unwrap();
    assert_eq!(items.len(), 1);

    let org = &items[0];
    assert_eq!(org.get("name"), Some(&Dynamic::from("Acme")));
    assert_eq!(
        org.get("api").and_then(|api| api.get("enabled")),
        Some(&Dynamic::Bool(true))
    );
    assert_eq!(
        org.get("cloud")
            .and_then(|cloud| cloud.get("region"))
            .and_then(|region| region.get("name")),
        Some(&Dynamic::from("North America"))
    );
    assert!(org.get("management").is_none());
}
