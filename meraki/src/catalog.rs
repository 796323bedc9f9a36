//! Endpoint descriptors for the supported resources and data sources

use crate::endpoint::{ApiAttribute, DataSourceDescriptor, ResourceDescriptor, ResourceKind};
use serde_json::Value;
use tfplug::reconcile::FieldMode::{Computed, Optional, OptionalComputed, Required};

const NETWORK_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("network_id", "id", Computed)
        .stable()
        .describe("Network ID"),
    ApiAttribute::string("organization_id", "organizationId", Required)
        .replace()
        .describe("Organization the network belongs to"),
    ApiAttribute::string("name", "name", Required).describe("Name of the network"),
    ApiAttribute::string_list("product_types", "productTypes", Required)
        .replace()
        .describe("Product types in the network, e.g. appliance, switch, wireless"),
    ApiAttribute::string("time_zone", "timeZone", OptionalComputed)
        .describe("Timezone of the network, e.g. America/Los_Angeles"),
    ApiAttribute::string_list("tags", "tags", Optional).describe("Network tags"),
    ApiAttribute::string("notes", "notes", Optional).describe("Additional notes"),
    ApiAttribute::string("enrollment_string", "enrollmentString", Optional)
        .describe("Enrollment string for Systems Manager devices"),
    ApiAttribute::string("url", "url", Computed).describe("Dashboard URL of the network"),
    ApiAttribute::bool(
        "is_bound_to_config_template",
        "isBoundToConfigTemplate",
        Computed,
    )
    .describe("Whether the network is bound to a configuration template"),
];

pub static NETWORK: ResourceDescriptor = ResourceDescriptor {
    type_name: "meraki_networks",
    description: "Manages a network in an organization",
    kind: ResourceKind::Collection {
        create_path: "/organizations/{organization_id}/networks",
        id_attribute: "network_id",
    },
    item_path: "/networks/{network_id}",
    import_attributes: &["network_id"],
    attributes: NETWORK_ATTRIBUTES,
    response_filter: None,
};

const AUTH_MODES: &[&str] = &[
    "open",
    "open-enhanced",
    "psk",
    "open-with-radius",
    "8021x-meraki",
    "8021x-radius",
    "8021x-google",
    "8021x-localradius",
    "ipsk-with-radius",
    "ipsk-without-radius",
];

const RADIUS_SERVER_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("id", "id", Computed).describe("RADIUS server ID"),
    ApiAttribute::string("host", "host", Required).describe("IP address of the RADIUS server"),
    ApiAttribute::number("port", "port", OptionalComputed).describe("UDP port of the RADIUS server"),
    ApiAttribute::string("secret", "secret", Optional)
        .sensitive()
        .describe("Shared secret; never returned by the API"),
];

const WIRELESS_SSID_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("network_id", "networkId", Required)
        .replace()
        .describe("Network ID"),
    ApiAttribute::number("number", "number", Required)
        .replace()
        .describe("SSID number, 0 to 14"),
    ApiAttribute::string("name", "name", Required).describe("Name of the SSID"),
    ApiAttribute::bool("enabled", "enabled", OptionalComputed)
        .describe("Whether the SSID is enabled"),
    ApiAttribute::string("auth_mode", "authMode", OptionalComputed)
        .one_of(AUTH_MODES)
        .describe("Association control method"),
    ApiAttribute::string("encryption_mode", "encryptionMode", OptionalComputed)
        .one_of(&["wep", "wpa", "wpa-eap"])
        .describe("PSK encryption mode"),
    ApiAttribute::string("psk", "psk", Optional)
        .sensitive()
        .describe("Passkey; never returned by the API"),
    ApiAttribute::string("wpa_encryption_mode", "wpaEncryptionMode", OptionalComputed)
        .describe("WPA encryption mode, e.g. WPA2 only"),
    ApiAttribute::string("ip_assignment_mode", "ipAssignmentMode", OptionalComputed)
        .describe("Client IP assignment mode, e.g. NAT mode or Bridge mode"),
    ApiAttribute::number("default_vlan_id", "defaultVlanId", OptionalComputed)
        .describe("Default VLAN for bridged clients"),
    ApiAttribute::number("min_bitrate", "minBitrate", OptionalComputed)
        .describe("Minimum bitrate in Mbps"),
    ApiAttribute::string("band_selection", "bandSelection", OptionalComputed)
        .describe("Client band selection"),
    ApiAttribute::number(
        "per_client_bandwidth_limit_up",
        "perClientBandwidthLimitUp",
        OptionalComputed,
    )
    .describe("Upload limit in Kbps, 0 for unlimited"),
    ApiAttribute::number(
        "per_client_bandwidth_limit_down",
        "perClientBandwidthLimitDown",
        OptionalComputed,
    )
    .describe("Download limit in Kbps, 0 for unlimited"),
    ApiAttribute::bool("visible", "visible", OptionalComputed)
        .describe("Whether the SSID is advertised"),
    ApiAttribute::bool("available_on_all_aps", "availableOnAllAps", OptionalComputed)
        .describe("Whether all APs broadcast the SSID"),
    ApiAttribute::string_list("availability_tags", "availabilityTags", OptionalComputed)
        .describe("AP tags the SSID is broadcast on"),
    ApiAttribute::object_list("radius_servers", "radiusServers", Optional, RADIUS_SERVER_ATTRIBUTES)
        .describe("RADIUS 802.1X servers"),
    ApiAttribute::string("splash_page", "splashPage", OptionalComputed)
        .describe("Splash page type"),
    ApiAttribute::string("admin_splash_url", "adminSplashUrl", Computed)
        .describe("Splash page URL shown in Dashboard"),
];

pub static WIRELESS_SSID: ResourceDescriptor = ResourceDescriptor {
    type_name: "meraki_networks_wireless_ssids",
    description: "Manages the attributes of an MR SSID",
    kind: ResourceKind::Settings,
    item_path: "/networks/{network_id}/wireless/ssids/{number}",
    import_attributes: &["network_id", "number"],
    attributes: WIRELESS_SSID_ATTRIBUTES,
    response_filter: None,
};

const FIXED_IP_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("ip", "ip", Required).describe("Reserved IP address"),
    ApiAttribute::string("name", "name", Optional).describe("Client name"),
];

const RESERVED_RANGE_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("start", "start", Required).describe("First IP of the range"),
    ApiAttribute::string("end", "end", Required).describe("Last IP of the range"),
    ApiAttribute::string("comment", "comment", Required).describe("Reason for the reservation"),
];

const APPLIANCE_VLAN_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("network_id", "networkId", Required)
        .replace()
        .describe("Network ID"),
    ApiAttribute::string("vlan_id", "id", Required)
        .replace()
        .describe("VLAN ID, 1 to 4094"),
    ApiAttribute::string("name", "name", Required).describe("Name of the VLAN"),
    ApiAttribute::string("subnet", "subnet", OptionalComputed)
        .describe("Subnet of the VLAN"),
    ApiAttribute::string("appliance_ip", "applianceIp", OptionalComputed)
        .describe("Local IP of the appliance on the VLAN"),
    ApiAttribute::string("group_policy_id", "groupPolicyId", Optional)
        .describe("Group policy applied to the VLAN"),
    ApiAttribute::string("template_vlan_type", "templateVlanType", OptionalComputed)
        .one_of(&["same", "unique"])
        .describe("Template VLAN type"),
    ApiAttribute::string("cidr", "cidr", OptionalComputed)
        .describe("CIDR of the pool of subnets"),
    ApiAttribute::number("mask", "mask", OptionalComputed)
        .describe("Mask used for the subnet of each network"),
    ApiAttribute::string("dhcp_handling", "dhcpHandling", OptionalComputed)
        .one_of(&[
            "Run a DHCP server",
            "Relay DHCP to another server",
            "Do not respond to DHCP requests",
        ])
        .describe("How the appliance handles DHCP requests"),
    ApiAttribute::string("dhcp_lease_time", "dhcpLeaseTime", OptionalComputed)
        .describe("DHCP lease time, e.g. 1 day"),
    ApiAttribute::string("dns_nameservers", "dnsNameservers", OptionalComputed)
        .describe("Nameservers handed out to clients"),
    ApiAttribute::object_map(
        "fixed_ip_assignments",
        "fixedIpAssignments",
        Optional,
        FIXED_IP_ATTRIBUTES,
    )
    .describe("DHCP reservations keyed by client MAC address"),
    ApiAttribute::object_list(
        "reserved_ip_ranges",
        "reservedIpRanges",
        Optional,
        RESERVED_RANGE_ATTRIBUTES,
    )
    .describe("Ranges excluded from DHCP"),
    ApiAttribute::string("interface_id", "interfaceId", Computed)
        .describe("Interface ID of the VLAN"),
];

pub static APPLIANCE_VLAN: ResourceDescriptor = ResourceDescriptor {
    type_name: "meraki_networks_appliance_vlans",
    description: "Manages a VLAN on an MX appliance",
    kind: ResourceKind::Collection {
        create_path: "/networks/{network_id}/appliance/vlans",
        id_attribute: "vlan_id",
    },
    item_path: "/networks/{network_id}/appliance/vlans/{vlan_id}",
    import_attributes: &["network_id", "vlan_id"],
    attributes: APPLIANCE_VLAN_ATTRIBUTES,
    response_filter: None,
};

const FIREWALL_RULE_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("comment", "comment", Optional).describe("Description of the rule"),
    ApiAttribute::string("policy", "policy", Required)
        .one_of(&["allow", "deny"])
        .describe("allow or deny"),
    ApiAttribute::string("protocol", "protocol", Required)
        .one_of(&["tcp", "udp", "icmp", "icmp6", "any"])
        .describe("Protocol matched by the rule"),
    ApiAttribute::string("src_port", "srcPort", OptionalComputed)
        .describe("Source ports, a range or Any"),
    ApiAttribute::string("src_cidr", "srcCidr", Required)
        .describe("Source CIDRs, comma separated, or Any"),
    ApiAttribute::string("dest_port", "destPort", OptionalComputed)
        .describe("Destination ports, a range or Any"),
    ApiAttribute::string("dest_cidr", "destCidr", Required)
        .describe("Destination CIDRs, comma separated, or Any"),
    ApiAttribute::bool("syslog_enabled", "syslogEnabled", Optional)
        .describe("Log matches to the syslog server"),
];

const L3_FIREWALL_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("network_id", "networkId", Required)
        .replace()
        .describe("Network ID"),
    ApiAttribute::object_list("rules", "rules", Optional, FIREWALL_RULE_ATTRIBUTES)
        .describe("Ordered firewall rules, excluding the default rule"),
    ApiAttribute::bool("syslog_default_rule", "syslogDefaultRule", Optional)
        .describe("Log the default rule to the syslog server"),
];

pub static L3_FIREWALL_RULES: ResourceDescriptor = ResourceDescriptor {
    type_name: "meraki_networks_appliance_firewall_l3_firewall_rules",
    description: "Manages the L3 firewall rules of an MX network",
    kind: ResourceKind::Settings,
    item_path: "/networks/{network_id}/appliance/firewall/l3FirewallRules",
    import_attributes: &["network_id"],
    attributes: L3_FIREWALL_ATTRIBUTES,
    response_filter: Some(strip_default_rule),
};

/// The API appends its implicit allow-all rule to every read
fn strip_default_rule(body: &mut Value) {
    if let Some(Value::Array(rules)) = body.get_mut("rules") {
        rules.retain(|rule| rule.get("comment").and_then(Value::as_str) != Some("Default rule"));
    }
}

const ORGANIZATION_API_ATTRIBUTES: &[ApiAttribute] =
    &[ApiAttribute::bool("enabled", "enabled", Computed)];

const ORGANIZATION_LICENSING_ATTRIBUTES: &[ApiAttribute] =
    &[ApiAttribute::string("model", "model", Computed)];

const CLOUD_REGION_ATTRIBUTES: &[ApiAttribute] = &[ApiAttribute::string("name", "name", Computed)];

const ORGANIZATION_CLOUD_ATTRIBUTES: &[ApiAttribute] = &[ApiAttribute::object(
    "region",
    "region",
    Computed,
    CLOUD_REGION_ATTRIBUTES,
)];

const ORGANIZATION_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("id", "id", Computed).describe("Organization ID"),
    ApiAttribute::string("name", "name", Computed).describe("Organization name"),
    ApiAttribute::string("url", "url", Computed).describe("Dashboard URL"),
    ApiAttribute::object("api", "api", Computed, ORGANIZATION_API_ATTRIBUTES)
        .describe("API access settings"),
    ApiAttribute::object("licensing", "licensing", Computed, ORGANIZATION_LICENSING_ATTRIBUTES)
        .describe("Licensing model"),
    ApiAttribute::object("cloud", "cloud", Computed, ORGANIZATION_CLOUD_ATTRIBUTES)
        .describe("Hosting region"),
];

pub static ORGANIZATIONS_DATA_SOURCE: DataSourceDescriptor = DataSourceDescriptor {
    type_name: "meraki_organizations",
    description: "Organizations the API key has access to",
    params: &[ApiAttribute::string("organization_id", "organizationId", Optional)
        .describe("Look up a single organization")],
    list_path: Some("/organizations"),
    item_path: Some("/organizations/{organization_id}"),
    selector: Some("organization_id"),
    attributes: ORGANIZATION_ATTRIBUTES,
};

const NETWORK_DATA_ATTRIBUTES: &[ApiAttribute] = &[
    ApiAttribute::string("id", "id", Computed),
    ApiAttribute::string("organization_id", "organizationId", Computed),
    ApiAttribute::string("name", "name", Computed),
    ApiAttribute::string_list("product_types", "productTypes", Computed),
    ApiAttribute::string("time_zone", "timeZone", Computed),
    ApiAttribute::string_list("tags", "tags", Computed),
    ApiAttribute::string("notes", "notes", Computed),
    ApiAttribute::string("enrollment_string", "enrollmentString", Computed),
    ApiAttribute::string("url", "url", Computed),
    ApiAttribute::bool("is_bound_to_config_template", "isBoundToConfigTemplate", Computed),
    ApiAttribute::string("config_template_id", "configTemplateId", Computed),
];

pub static NETWORKS_DATA_SOURCE: DataSourceDescriptor = DataSourceDescriptor {
    type_name: "meraki_networks",
    description: "Networks in an organization",
    params: &[
        ApiAttribute::string("organization_id", "organizationId", Optional)
            .describe("Organization to list networks from"),
        ApiAttribute::string("network_id", "networkId", Optional)
            .describe("Look up a single network"),
        ApiAttribute::string("config_template_id", "configTemplateId", Optional)
            .describe("Only networks bound to this template"),
        ApiAttribute::bool("is_bound_to_config_template", "isBoundToConfigTemplate", Optional)
            .describe("Filter on template binding"),
        ApiAttribute::string("tags_filter_type", "tagsFilterType", Optional)
            .one_of(&["withAnyTags", "withAllTags"])
            .describe("How tags are matched"),
        ApiAttribute::number("per_page", "perPage", Optional)
            .describe("Entries per page, 3 to 100000"),
    ],
    list_path: Some("/organizations/{organization_id}/networks"),
    item_path: Some("/networks/{network_id}"),
    selector: Some("network_id"),
    attributes: NETWORK_DATA_ATTRIBUTES,
};

pub static WIRELESS_SSIDS_DATA_SOURCE: DataSourceDescriptor = DataSourceDescriptor {
    type_name: "meraki_networks_wireless_ssids",
    description: "MR SSIDs of a network",
    params: &[
        ApiAttribute::string("network_id", "networkId", Required).describe("Network ID"),
        ApiAttribute::number("number", "number", Optional).describe("Look up a single SSID"),
    ],
    list_path: Some("/networks/{network_id}/wireless/ssids"),
    item_path: Some("/networks/{network_id}/wireless/ssids/{number}"),
    selector: Some("number"),
    attributes: WIRELESS_SSID_ATTRIBUTES,
};

pub fn resources() -> [&'static ResourceDescriptor; 4] {
    [&NETWORK, &WIRELESS_SSID, &APPLIANCE_VLAN, &L3_FIREWALL_RULES]
}

pub fn data_sources() -> [&'static DataSourceDescriptor; 3] {
    [
        &ORGANIZATIONS_DATA_SOURCE,
        &NETWORKS_DATA_SOURCE,
        &WIRELESS_SSIDS_DATA_SOURCE,
    ]
}
