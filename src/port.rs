use core::fmt;

/// OpenFlow port numbers
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PortNumber {
    /// maximum number of physical and logical switch ports
    Max,
    /// Output port not set in action-set.
    Unset,
    /// Send the packet out the input port.
    InPort,
    /// Submit the packet to the first flow table. This destination port can only be used in
    /// packet-out messages.
    Table,
    /// Forward using non OpenFlow pipeline.
    Normal,
    /// Flood using non OpenFlow pipeline.
    Flood,
    /// Flood through all standard ports except input port.
    All,
    /// Send to controller
    Controller,
    /// Local OpenFlow "port"
    Local,
    /// Special value used in some requests when no port is specified (i.e. wildcarded)
    Any,
    /// A regular port number
    Regular(u32),
}

impl PortNumber {
    /// The textual name of a reserved port, `None` for regular ports.
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            PortNumber::Max => Some("max"),
            PortNumber::Unset => Some("unset"),
            PortNumber::InPort => Some("in_port"),
            PortNumber::Table => Some("table"),
            PortNumber::Normal => Some("normal"),
            PortNumber::Flood => Some("flood"),
            PortNumber::All => Some("all"),
            PortNumber::Controller => Some("controller"),
            PortNumber::Local => Some("local"),
            PortNumber::Any => Some("any"),
            PortNumber::Regular(_) => None,
        }
    }

    /// Resolve a reserved port name. Note that `"in_port"` is a valid
    /// value: inside the value half of a rule token it always means the
    /// reserved port, never the field label.
    pub fn from_name(name: &str) -> Option<Self> {
        let port = match name {
            "max" => PortNumber::Max,
            "unset" => PortNumber::Unset,
            "in_port" => PortNumber::InPort,
            "table" => PortNumber::Table,
            "normal" => PortNumber::Normal,
            "flood" => PortNumber::Flood,
            "all" => PortNumber::All,
            "controller" => PortNumber::Controller,
            "local" => PortNumber::Local,
            "any" => PortNumber::Any,
            _ => return None,
        };
        Some(port)
    }
}

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", u32::from(*self)),
        }
    }
}

impl From<u32> for PortNumber {
    fn from(value: u32) -> Self {
        match value {
            0xffff_ff00 => PortNumber::Max,
            0xffff_fff7 => PortNumber::Unset,
            0xffff_fff8 => PortNumber::InPort,
            0xffff_fff9 => PortNumber::Table,
            0xffff_fffa => PortNumber::Normal,
            0xffff_fffb => PortNumber::Flood,
            0xffff_fffc => PortNumber::All,
            0xffff_fffd => PortNumber::Controller,
            0xffff_fffe => PortNumber::Local,
            0xffff_ffff => PortNumber::Any,
            other => PortNumber::Regular(other),
        }
    }
}

impl From<PortNumber> for u32 {
    fn from(value: PortNumber) -> Self {
        match value {
            PortNumber::Max => 0xffff_ff00,
            PortNumber::Unset => 0xffff_fff7,
            PortNumber::InPort => 0xffff_fff8,
            PortNumber::Table => 0xffff_fff9,
            PortNumber::Normal => 0xffff_fffa,
            PortNumber::Flood => 0xffff_fffb,
            PortNumber::All => 0xffff_fffc,
            PortNumber::Controller => 0xffff_fffd,
            PortNumber::Local => 0xffff_fffe,
            PortNumber::Any => 0xffff_ffff,
            PortNumber::Regular(other) => other,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_round_trip() {
        for value in [0xffff_ff00, 0xffff_fff8, 0xffff_ffff] {
            let port = PortNumber::from(value);
            let name = port.name().unwrap();
            assert_eq!(PortNumber::from_name(name), Some(port));
        }
        assert_eq!(PortNumber::from_name("7"), None);
        assert_eq!(PortNumber::Regular(7).to_string(), "7");
        assert_eq!(PortNumber::Controller.to_string(), "controller");
    }
}
