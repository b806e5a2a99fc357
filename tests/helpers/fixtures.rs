use serde_json::{json, Value};

fn server(name: &str) -> Value {
    json!({"type": "device", "subtype": "server", "name": name, "ext-name": name})
}

/// `srv1..3` in `datacenter`; `srv11` and (inside a room) `srv21` in
/// `datacenter1`, plus the reserved controller.
pub fn datacenters() -> Value {
    json!({
        "items": [
            {"type": "datacenter", "name": "datacenter", "items": [
                server("srv1"), server("srv2"), server("srv3")
            ]},
            {"type": "datacenter", "name": "datacenter1", "items": [
                server("srv11"),
                {"type": "room", "name": "room-1", "items": [server("srv21")]},
                {"type": "device", "subtype": "rackcontroller", "name": "rackcontroller-0"}
            ]}
        ]
    })
}

/// Assets whose display name differs from the internal one, and one without
/// a display name at all.
pub fn renamed() -> Value {
    json!({
        "items": [
            {"type": "datacenter", "name": "datacenter-3", "ext-name": "DC1", "items": [
                {"type": "device", "subtype": "server", "name": "server-7", "ext-name": "srv1"},
                {"type": "device", "subtype": "server", "name": "server-8", "ext-name": "srv2"},
                {"type": "device", "subtype": "server", "name": "server-9"}
            ]}
        ]
    })
}

/// Servers carrying contact, hostname and address attributes.
pub fn attributes() -> Value {
    json!({
        "items": [
            {"type": "datacenter", "name": "datacenter", "items": [
                {"type": "device", "subtype": "server", "name": "srv11", "ext-name": "srv11", "attrs": {
                    "device.contact": "dim",
                    "hostname.1": "localhost",
                    "ip.1": "127.0.0.1"
                }},
                {"type": "device", "subtype": "server", "name": "srv12", "ext-name": "srv12", "attrs": {
                    "contact_email": "dim@eaton.com"
                }}
            ]},
            {"type": "datacenter", "name": "datacenter1", "items": [
                {"type": "device", "subtype": "server", "name": "srv21", "ext-name": "srv21", "attrs": {
                    "ip.1": "192.168.0.1"
                }}
            ]}
        ]
    })
}

/// Two hypervisors hosting three virtual machines.
pub fn virtualization() -> Value {
    json!({
        "items": [
            {"type": "connector", "name": "connector"},
            {"type": "infra-service", "name": "infra"},
            {"type": "hypervisor", "name": "hypervisor", "attrs": {
                "hostName": "hypo", "address": "[/127.0.0.1,]"
            }},
            {"type": "hypervisor", "name": "hypervisor1", "attrs": {
                "hostName": "hypo1", "address": "[/192.168.0.1,]"
            }},
            {"type": "virtual-machine", "name": "vm1"},
            {"type": "virtual-machine", "name": "vm2"},
            {"type": "virtual-machine", "name": "vm3"}
        ],
        "links": [
            {"src": "hypervisor", "dest": "vm1", "type": "vmware.esxi.hosts.vm"},
            {"src": "hypervisor", "dest": "vm2", "type": "vmware.esxi.hosts.vm"},
            {"src": "hypervisor1", "dest": "vm3", "type": "vmware.esxi.hosts.vm"},
            {"src": "infra", "dest": "hypervisor", "type": "vmware.vcenter.monitors.esxi"},
            {"src": "infra", "dest": "hypervisor1", "type": "vmware.vcenter.monitors.esxi"},
            {"src": "connector", "dest": "infra", "type": "vmware.connected.to.vcenter"}
        ]
    })
}

/// Hypervisor inside a rack; its virtual machine sits outside the location tree.
pub fn hosted_in_rack() -> Value {
    json!({
        "items": [
            {"type": "datacenter", "name": "datacenter", "items": [
                {"type": "rack", "name": "rack-1", "items": [
                    {"type": "hypervisor", "name": "esxi-1"}
                ]}
            ]},
            {"type": "virtual-machine", "name": "vm1"}
        ],
        "links": [
            {"src": "esxi-1", "dest": "vm1", "type": "vmware.esxi.hosts.vm"}
        ]
    })
}
