/// the authenticator API, consisting of "operations"
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    MakeCredential,
    GetAssertion,
    GetNextAssertion,
    GetInfo,
    ClientPin,
    Reset,
    /// vendors are assigned the range 0x40..=0xbf for custom operations
    Vendor(VendorOperation),
}

impl From<Operation> for u8 {
    fn from(operation: Operation) -> u8 {
        use Operation::*;
        match operation {
            MakeCredential => 0x01,
            GetAssertion => 0x02,
            GetInfo => 0x04,
            ClientPin => 0x06,
            Reset => 0x07,
            GetNextAssertion => 0x08,
            Vendor(operation) => operation.into(),
        }
    }
}

impl Operation {
    pub fn into_u8(self) -> u8 {
        self.into()
    }
}

/// Vendor CTAP2 operations, from 0x40 to 0xbf.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VendorOperation(u8);

impl VendorOperation {
    pub const FIRST: u8 = 0x40;
    pub const LAST: u8 = 0xbf;
}

impl TryFrom<u8> for VendorOperation {
    type Error = ();

    fn try_from(from: u8) -> core::result::Result<Self, ()> {
        match from {
            code @ Self::FIRST..=Self::LAST => Ok(VendorOperation(code)),
            _ => Err(()),
        }
    }
}

impl From<VendorOperation> for u8 {
    fn from(operation: VendorOperation) -> u8 {
        operation.0
    }
}

impl TryFrom<u8> for Operation {
    type Error = ();

    fn try_from(from: u8) -> core::result::Result<Operation, ()> {
        use Operation::*;
        Ok(match from {
            0x01 => MakeCredential,
            0x02 => GetAssertion,
            0x04 => GetInfo,
            0x06 => ClientPin,
            0x07 => Reset,
            0x08 => GetNextAssertion,
            code @ VendorOperation::FIRST..=VendorOperation::LAST => {
                Vendor(VendorOperation::try_from(code)?)
            }
            _ => return Err(()),
        })
    }
}
