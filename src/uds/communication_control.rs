//! `CommunicationControl` (0x28): enables or disables the ECU's own
//! transmit/receive paths on a given subnet.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

/// `controlType` sub-function: which direction(s) of ECU communication to
/// enable or disable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommunicationLevel {
    /// Enable both reception and transmission.
    EnableRxAndTx,
    /// Enable reception, disable transmission.
    EnableRxDisableTx,
    /// Disable reception, enable transmission.
    DisableRxEnableTx,
    /// Disable both reception and transmission.
    DisableRxAndTx,
    /// Enable reception, disable transmission, with enhanced address information.
    EnableRxDisableTxEnhanced,
    /// Enable both, with enhanced address information.
    EnableRxAndTxEnhanced,
}

impl From<CommunicationLevel> for u8 {
    fn from(value: CommunicationLevel) -> u8 {
        match value {
            CommunicationLevel::EnableRxAndTx => 0x00,
            CommunicationLevel::EnableRxDisableTx => 0x01,
            CommunicationLevel::DisableRxEnableTx => 0x02,
            CommunicationLevel::DisableRxAndTx => 0x03,
            CommunicationLevel::EnableRxDisableTxEnhanced => 0x04,
            CommunicationLevel::EnableRxAndTxEnhanced => 0x05,
        }
    }
}

/// Which communication type (low nibble of the `communicationType` byte)
/// is affected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EcuCommunicationType {
    /// Normal application-layer communication.
    NormalCommunication,
    /// Network management communication.
    NetworkManagementCommunication,
    /// Both normal and network management communication.
    NormalAndNetworkManagementCommunication,
}

impl From<EcuCommunicationType> for u8 {
    fn from(value: EcuCommunicationType) -> u8 {
        match value {
            EcuCommunicationType::NormalCommunication => 0x01,
            EcuCommunicationType::NetworkManagementCommunication => 0x02,
            EcuCommunicationType::NormalAndNetworkManagementCommunication => 0x03,
        }
    }
}

/// The subnet (high nibble of the `communicationType` byte) addressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Subnet {
    /// Only this network.
    CurrentNetwork,
    /// A specific numbered subnet (1..=14).
    Numbered(u8),
    /// Every connected subnet.
    AllSubnets,
}

impl From<Subnet> for u8 {
    fn from(value: Subnet) -> u8 {
        match value {
            Subnet::CurrentNetwork => 0x0,
            Subnet::Numbered(n) => n & 0x0F,
            Subnet::AllSubnets => 0xF,
        }
    }
}

fn encode_communication_type(communication_type: EcuCommunicationType, subnet: Subnet) -> u8 {
    (u8::from(subnet) << 4) | u8::from(communication_type)
}

impl UdsSessionEngine {
    /// Enables or disables the ECU's own communication on `subnet`. The
    /// setting persists until the ECU is power-cycled.
    pub fn communication_control(
        &self,
        communication_type: EcuCommunicationType,
        subnet: Subnet,
        comm_level: CommunicationLevel,
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let type_byte = encode_communication_type(communication_type, subnet);
        let request = UdsRequest::with_sub_function(
            UdsService::CommunicationControl,
            comm_level.into(),
            vec![type_byte],
            timeout,
        );
        self.send_request(request)
    }
}
