//! Attribute model shared by the dispatcher, the services and the peripheral backends.

use std::fmt;

use anyhow::{bail, Result};
use bluer::Address;
use enumflags2::{bitflags, BitFlags};
use uuid::Uuid;

/// Client characteristic configuration descriptor.
pub const CCCD_UUID: Uuid = uuid16(0x2902);

/// Expand a 16 bit SIG assigned number into a full bluetooth base UUID.
pub const fn uuid16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5F9B_34FB)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(pub u16);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service#{:04x}", self.0)
    }
}

/// A remote device connected to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Central {
    pub address: Address,
}

impl Central {
    pub fn new(address: Address) -> Self {
        Central { address }
    }
}

impl fmt::Display for Central {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.address, f)
    }
}

/// ATT status codes as returned to a central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GattStatus {
    Success = 0x00,
    InvalidHandle = 0x01,
    ReadNotPermitted = 0x02,
    WriteNotPermitted = 0x03,
    InvalidPdu = 0x04,
    InsufficientAuthentication = 0x05,
    RequestNotSupported = 0x06,
    InvalidOffset = 0x07,
    InsufficientAuthorization = 0x08,
    AttributeNotFound = 0x0A,
    AttributeNotLong = 0x0B,
    InvalidAttributeValueLength = 0x0D,
    UnlikelyError = 0x0E,
    InsufficientEncryption = 0x0F,
    InsufficientResources = 0x11,
    ValueNotAllowed = 0x13,
    CccdImproperlyConfigured = 0xFD,
    ProcedureInProgress = 0xFE,
    OutOfRange = 0xFF,
}

impl GattStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self == GattStatus::Success
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:02x})", self, self.code())
    }
}

/// Answer to a characteristic or descriptor read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub status: GattStatus,
    pub value: Option<Vec<u8>>,
}

impl ReadResponse {
    pub fn new(status: GattStatus, value: Option<Vec<u8>>) -> Self {
        ReadResponse { status, value }
    }

    pub fn success(value: impl Into<Vec<u8>>) -> Self {
        ReadResponse {
            status: GattStatus::Success,
            value: Some(value.into()),
        }
    }

    /// What the platform answers when nobody handles a read.
    pub fn not_supported() -> Self {
        ReadResponse {
            status: GattStatus::RequestNotSupported,
            value: None,
        }
    }

    /// Serve a (long) read starting at `offset` into the value.
    pub fn at_offset(self, offset: u16) -> Self {
        if offset == 0 || !self.status.is_success() {
            return self;
        }
        let offset = offset as usize;
        let value = self.value.unwrap_or_default();
        if offset > value.len() {
            return ReadResponse::new(GattStatus::InvalidOffset, None);
        }
        ReadResponse::success(&value[offset..])
    }
}

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Broadcast = 0x01,
    Read = 0x02,
    WriteWithoutResponse = 0x04,
    Write = 0x08,
    Notify = 0x10,
    Indicate = 0x20,
    SignedWrite = 0x40,
    ExtendedProps = 0x80,
}

/// Reference to a characteristic as carried by callbacks.
///
/// `service` is the identity of the owning service. The platform is expected to always fill it
/// in, it is an `Option` because nothing in the attribute tree owns the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub id: CharacteristicId,
    pub uuid: Uuid,
    pub service: Option<ServiceId>,
}

/// Reference to a descriptor as carried by callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorRef {
    pub id: DescriptorId,
    pub uuid: Uuid,
    pub characteristic: Option<CharacteristicRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub id: DescriptorId,
    pub uuid: Uuid,
    pub readable: bool,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub id: CharacteristicId,
    pub uuid: Uuid,
    pub properties: BitFlags<Property>,
    pub descriptors: Vec<Descriptor>,
}

/// Definition of a service as handed to the peripheral manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub id: ServiceId,
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<Characteristic>,
}

impl GattService {
    /// Start a new primary service. Attribute handles are allocated consecutively from `id`.
    pub fn build(id: ServiceId, uuid: Uuid) -> ServiceBuilder {
        ServiceBuilder {
            next_handle: id.0.checked_add(1),
            exhausted: false,
            service: GattService {
                id,
                uuid,
                primary: true,
                characteristics: Vec::new(),
            },
        }
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<CharacteristicRef> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .map(|c| self.characteristic_ref(c))
    }

    pub fn characteristic_ref(&self, characteristic: &Characteristic) -> CharacteristicRef {
        CharacteristicRef {
            id: characteristic.id,
            uuid: characteristic.uuid,
            service: Some(self.id),
        }
    }

    pub fn descriptor_ref(
        &self,
        characteristic: &Characteristic,
        descriptor: &Descriptor,
    ) -> DescriptorRef {
        DescriptorRef {
            id: descriptor.id,
            uuid: descriptor.uuid,
            characteristic: Some(self.characteristic_ref(characteristic)),
        }
    }
}

pub struct ServiceBuilder {
    service: GattService,
    next_handle: Option<u16>,
    exhausted: bool,
}

impl ServiceBuilder {
    fn next_handle(&mut self) -> u16 {
        match self.next_handle {
            Some(x) => {
                self.next_handle = x.checked_add(1);
                x
            }
            None => {
                self.exhausted = true;
                u16::MAX
            }
        }
    }

    pub fn characteristic(mut self, uuid: Uuid, properties: BitFlags<Property>) -> Self {
        self.add_characteristic(uuid, properties);
        self
    }

    /// Like [`ServiceBuilder::characteristic`] but hands back a reference to the new
    /// characteristic.
    pub fn add_characteristic(
        &mut self,
        uuid: Uuid,
        properties: BitFlags<Property>,
    ) -> CharacteristicRef {
        // declaration + value
        self.next_handle();
        let id = CharacteristicId(self.next_handle());
        let mut descriptors = Vec::new();
        if properties.intersects(Property::Notify | Property::Indicate) {
            descriptors.push(Descriptor {
                id: DescriptorId(self.next_handle()),
                uuid: CCCD_UUID,
                readable: true,
                writable: true,
            });
        }
        self.service.characteristics.push(Characteristic {
            id,
            uuid,
            properties,
            descriptors,
        });
        CharacteristicRef {
            id,
            uuid,
            service: Some(self.service.id),
        }
    }

    /// Attach a descriptor to the last added characteristic.
    pub fn descriptor(mut self, uuid: Uuid, readable: bool, writable: bool) -> Self {
        let id = DescriptorId(self.next_handle());
        if let Some(c) = self.service.characteristics.last_mut() {
            c.descriptors.push(Descriptor {
                id,
                uuid,
                readable,
                writable,
            });
        }
        self
    }

    /// Fails if the attributes ran past the last handle.
    pub fn finish(self) -> Result<GattService> {
        if self.exhausted {
            bail!("{} does not fit in the attribute handle range", self.service.id);
        }
        Ok(self.service)
    }
}
