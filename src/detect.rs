use crate::{
    error::*,
    util::{split_descriptors, BytesExt},
    Result,
};
use rusb::{Context, Device, TransferType};
use uuid::Uuid;
use zerocopy::FromBytes;

const IAD_DEVICE_CLASS: u8 = 0xEF;
const IAD_DEVICE_SUBCLASS: u8 = 0x02;
const IAD_DEVICE_PROTOCOL: u8 = 0x01;

const UVC_IAD_CLASS: u8 = 0x0E;
const UVC_IAD_SUBCLASS: u8 = 0x03;
const UVC_IAD_PROTOCOL: u8 = 0x00;

const UVC_INTERF_CLASS: u8 = 0x0E;
const UVC_INTERF_SUBCLASS_STREAMING: u8 = 2;

const DESC_TYPE_IAD: u8 = 11;
const DESC_TYPE_CS_INTERFACE: u8 = 0x24;
const VS_FORMAT_UNCOMPRESSED: u8 = 0x04;

/// Identifies the bulk pipe a session transfers video over.
///
/// Real devices differ in which interface carries the bulk endpoint, so this is carried as data
/// from detection to session setup rather than assumed.
#[derive(Debug, Clone, Copy)]
pub struct EndpointSpec {
    pub interface: u8,
    pub endpoint_address: u8,
    pub max_packet_size: u16,
}

/// Everything needed to stream from a bulk-variant UVC device, extracted from its descriptors.
#[derive(Debug)]
pub(crate) struct BulkUvcInfo {
    pub(crate) endpoint: EndpointSpec,
    /// Format GUID from the VS uncompressed format descriptor, if the device declares one.
    pub(crate) format_guid: Option<Uuid>,
}

#[derive(Debug, FromBytes)]
#[repr(C)]
#[allow(non_snake_case)]
struct InterfaceAssociationDescriptor {
    bLength: u8,
    bDescriptorType: u8,
    bFirstInterface: u8,
    bInterfaceCount: u8,
    bFunctionClass: u8,
    bFunctionSubClass: u8,
    bFunctionProtocol: u8,
    iFunction: u8,
}

pub(crate) fn detect_bulk_uvc(device: &Device<Context>) -> Result<Option<BulkUvcInfo>> {
    // UVC uses an Interface Association Descriptor (IAD) and the corresponding device class.

    let device_desc = device
        .device_descriptor()
        .during(Action::AccessingDeviceDescriptor)?;

    log::trace!(
        "Bus {:03} Device {:03} {:04x}:{:04x}",
        device.bus_number(),
        device.address(),
        device_desc.vendor_id(),
        device_desc.product_id(),
    );

    if device_desc.class_code() != IAD_DEVICE_CLASS
        || device_desc.sub_class_code() != IAD_DEVICE_SUBCLASS
        || device_desc.protocol_code() != IAD_DEVICE_PROTOCOL
    {
        log::trace!("not an IAD device");
        return Ok(None);
    }

    if device_desc.num_configurations() != 1 {
        log::debug!(
            "device has {} configurations, we can only handle 1",
            device_desc.num_configurations()
        );
        return Ok(None);
    }

    let config_desc = device
        .config_descriptor(0)
        .during(Action::AccessingDeviceDescriptor)?;

    let iad = split_descriptors(config_desc.extra()).find_map(|(desc_ty, data)| {
        if desc_ty == DESC_TYPE_IAD {
            match InterfaceAssociationDescriptor::read_from_prefix(data) {
                Some(desc) => Some(desc),
                None => {
                    log::warn!("failed to parse IAD from {:x?}", data);
                    None
                }
            }
        } else {
            None
        }
    });

    let iad = match iad {
        Some(iad) => iad,
        None => {
            log::warn!("found no IAD despite device class indicating that there is one");
            return Ok(None);
        }
    };

    log::debug!("{:?}", iad);

    if iad.bFunctionClass != UVC_IAD_CLASS
        || iad.bFunctionSubClass != UVC_IAD_SUBCLASS
        || iad.bFunctionProtocol != UVC_IAD_PROTOCOL
    {
        log::trace!("not a video device");
        return Ok(None);
    }

    let (first_interface, last_interface) = match iad_interface_range(&iad) {
        Some(range) => range,
        None => {
            log::warn!(
                "IAD declares an invalid interface range ({} from {})",
                iad.bInterfaceCount,
                iad.bFirstInterface
            );
            return Ok(None);
        }
    };
    for interface in config_desc.interfaces() {
        if interface.number() < first_interface || interface.number() > last_interface {
            continue;
        }

        // Alt setting 0 carries the class-specific descriptors; bulk-variant devices keep their
        // endpoint there as well (no alternate-setting bandwidth selection as with isochronous).
        let desc = match interface.descriptors().next() {
            Some(desc) => desc,
            None => continue,
        };
        if desc.class_code() != UVC_INTERF_CLASS
            || desc.sub_class_code() != UVC_INTERF_SUBCLASS_STREAMING
        {
            continue;
        }

        let bulk_ep = desc
            .endpoint_descriptors()
            .find(|ep| ep.transfer_type() == TransferType::Bulk && ep.direction() == rusb::Direction::In);
        let ep = match bulk_ep {
            Some(ep) => ep,
            None => {
                log::debug!(
                    "streaming interface {} has no bulk IN endpoint, skipping",
                    desc.interface_number()
                );
                continue;
            }
        };

        let format_guid = parse_format_guid(desc.extra());
        log::debug!(
            "streaming interface {} endpoint {:#04x}, format GUID {:?}",
            desc.interface_number(),
            ep.address(),
            format_guid,
        );

        return Ok(Some(BulkUvcInfo {
            endpoint: EndpointSpec {
                interface: desc.interface_number(),
                endpoint_address: ep.address(),
                max_packet_size: ep.max_packet_size(),
            },
            format_guid,
        }));
    }

    log::debug!("video device without a bulk streaming interface");
    Ok(None)
}

/// Inclusive interface range covered by an IAD. Device-provided data: a zero count or a range
/// running past interface 255 is rejected rather than trusted.
fn iad_interface_range(iad: &InterfaceAssociationDescriptor) -> Option<(u8, u8)> {
    if iad.bInterfaceCount == 0 {
        return None;
    }
    let last = iad.bFirstInterface.checked_add(iad.bInterfaceCount - 1)?;
    Some((iad.bFirstInterface, last))
}

/// Pulls the format GUID out of the VS uncompressed format descriptor, if present.
fn parse_format_guid(extra: &[u8]) -> Option<Uuid> {
    split_descriptors(extra).find_map(|(desc_ty, data)| {
        if desc_ty != DESC_TYPE_CS_INTERFACE || data.len() < 21 {
            return None;
        }
        if data[2] != VS_FORMAT_UNCOMPRESSED {
            return None;
        }

        // bLength, bDescriptorType, bDescriptorSubtype, bFormatIndex, bNumFrameDescriptors,
        // then the 16-byte guidFormat.
        let mut guid_bytes = &data[5..21];
        match guid_bytes.read_guid() {
            Ok(guid) => Some(guid),
            Err(e) => {
                log::warn!("failed to parse format GUID: {}", e);
                None
            }
        }
    })
}
