//! Binary encoding of packets.
//!
//! Every packet is a single `u8` packet id followed by its payload; there is no
//! length prefix, so decoding reads exactly as many bytes as the payload layout
//! asks for. All integers are big-endian and strings are a `u16` byte length
//! followed by UTF-8.
//!
//! Entries and mapping trees nest, but both directions walk them with explicit
//! stacks, and decoding refuses anything nested deeper than [`MAX_TREE_DEPTH`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{
    error::SyncError,
    protocol::{C2sPacket, KickReason, LoginC2s, S2cPacket, ServerMessage, c2s_id, s2c_id},
};
use crate::{
    constants::{CHECKSUM_SIZE, MAX_PASSWORD_LENGTH, MAX_STRING_LENGTH, MAX_TREE_DEPTH, PROTOCOL_VERSION},
    entry::{ClassEntry, Entry, FieldEntry, LocalVariableEntry, MethodEntry},
    mapping::{EntryChange, EntryMapping, TokenType, TristateChange},
    tree::EntryTree,
};

const ENTRY_CLASS: u8 = 0;
const ENTRY_FIELD: u8 = 1;
const ENTRY_METHOD: u8 = 2;
const ENTRY_LOCAL_VARIABLE: u8 = 3;

const TRISTATE_UNCHANGED: u8 = 0;
const TRISTATE_SET: u8 = 1;
const TRISTATE_RESET: u8 = 2;

/// Encode a client packet, including its packet id.
pub fn encode_c2s(packet: &C2sPacket) -> Result<Vec<u8>, SyncError> {
    let mut enc = Encoder::new(packet.id());
    match packet {
        C2sPacket::Login(login) => {
            enc.u16(login.version);
            enc.bytes(&login.checksum);
            enc.password(&login.password)?;
            enc.string(&login.username)?;
        }
        C2sPacket::ConfirmChange { sync_id } => enc.u16(*sync_id),
        C2sPacket::Message { message } => enc.string(message)?,
        C2sPacket::EntryChange { change } => enc.change(change)?,
    }
    Ok(enc.finish())
}

/// Encode a server packet, including its packet id.
pub fn encode_s2c(packet: &S2cPacket) -> Result<Vec<u8>, SyncError> {
    let mut enc = Encoder::new(packet.id());
    match packet {
        S2cPacket::Kick { reason } => enc.string(reason.code())?,
        S2cPacket::SyncMappings { mappings } => enc.tree(mappings)?,
        S2cPacket::Message { message } => enc.server_message(message)?,
        S2cPacket::UserList { users } => {
            enc.len_u16(users.len(), "user list")?;
            for user in users {
                enc.string(user)?;
            }
        }
        S2cPacket::EntryChange { sync_id, change } => {
            enc.u16(*sync_id);
            enc.change(change)?;
        }
    }
    Ok(enc.finish())
}

/// Write an encoded packet and flush it.
pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<(), SyncError> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next client packet.
///
/// A login announcing another protocol version fails with
/// [`SyncError::ProtocolMismatch`] before the rest of its payload is read.
pub async fn read_c2s<R: AsyncRead + Unpin>(reader: &mut R) -> Result<C2sPacket, SyncError> {
    let mut dec = Decoder { reader };
    let packet = match dec.packet_id().await? {
        c2s_id::LOGIN => {
            let version = dec.u16().await?;
            if version != PROTOCOL_VERSION {
                return Err(SyncError::ProtocolMismatch {
                    expected: PROTOCOL_VERSION,
                    received: version,
                });
            }
            let mut checksum = [0u8; CHECKSUM_SIZE];
            dec.reader.read_exact(&mut checksum).await?;
            let password = dec.password().await?;
            let username = dec.string().await?;
            C2sPacket::Login(LoginC2s {
                version,
                checksum,
                password,
                username,
            })
        }
        c2s_id::CONFIRM_CHANGE => C2sPacket::ConfirmChange {
            sync_id: dec.u16().await?,
        },
        c2s_id::MESSAGE => C2sPacket::Message {
            message: dec.string().await?,
        },
        c2s_id::ENTRY_CHANGE => C2sPacket::EntryChange {
            change: dec.change().await?,
        },
        id => return Err(SyncError::UnknownPacket { id }),
    };
    Ok(packet)
}

/// Read the next server packet.
pub async fn read_s2c<R: AsyncRead + Unpin>(reader: &mut R) -> Result<S2cPacket, SyncError> {
    let mut dec = Decoder { reader };
    let packet = match dec.packet_id().await? {
        s2c_id::KICK => S2cPacket::Kick {
            reason: KickReason::from_code(&dec.string().await?),
        },
        s2c_id::SYNC_MAPPINGS => S2cPacket::SyncMappings {
            mappings: dec.tree().await?,
        },
        s2c_id::MESSAGE => S2cPacket::Message {
            message: dec.server_message().await?,
        },
        s2c_id::USER_LIST => {
            let count = dec.u16().await?;
            let mut users = Vec::with_capacity(count.into());
            for _ in 0..count {
                users.push(dec.string().await?);
            }
            S2cPacket::UserList { users }
        }
        s2c_id::ENTRY_CHANGE => S2cPacket::EntryChange {
            sync_id: dec.u16().await?,
            change: dec.change().await?,
        },
        id => return Err(SyncError::UnknownPacket { id }),
    };
    Ok(packet)
}

struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn new(packet_id: u8) -> Self {
        Self { buf: vec![packet_id] }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn len_u16(&mut self, len: usize, what: &str) -> Result<(), SyncError> {
        let len = u16::try_from(len)
            .map_err(|_| SyncError::InvalidPacket(format!("{what} has {len} elements, more than fit")))?;
        self.u16(len);
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<(), SyncError> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_STRING_LENGTH {
            return Err(SyncError::StringTooLong {
                length: bytes.len(),
                max: MAX_STRING_LENGTH,
            });
        }
        self.u16(bytes.len() as u16);
        self.bytes(bytes);
        Ok(())
    }

    /// Passwords travel as UTF-16 units behind a single length byte.
    fn password(&mut self, password: &str) -> Result<(), SyncError> {
        let units: Vec<u16> = password.encode_utf16().collect();
        if units.len() > MAX_PASSWORD_LENGTH {
            return Err(SyncError::PasswordTooLong {
                length: units.len(),
                max: MAX_PASSWORD_LENGTH,
            });
        }
        self.u8(units.len() as u8);
        units.into_iter().for_each(|unit| self.u16(unit));
        Ok(())
    }

    /// An entry with its whole parent chain.
    ///
    /// The chain is written as the kinds from the entry up to its root, each
    /// followed by a has-parent flag, and then the bodies from the root down.
    fn entry(&mut self, entry: &Entry) -> Result<(), SyncError> {
        let ancestry = entry.ancestry();
        for link in ancestry.iter().rev() {
            self.u8(entry_kind(link));
            self.bool(link.parent().is_some());
        }
        for link in &ancestry {
            self.entry_body(link)?;
        }
        Ok(())
    }

    /// An entry whose parent is known from context.
    fn contextual_entry(&mut self, entry: &Entry) -> Result<(), SyncError> {
        self.u8(entry_kind(entry));
        self.entry_body(entry)
    }

    fn entry_body(&mut self, entry: &Entry) -> Result<(), SyncError> {
        self.string(entry.name())?;
        match entry {
            Entry::Class(_) => {}
            Entry::Field(field) => self.string(field.desc())?,
            Entry::Method(method) => self.string(method.desc())?,
            Entry::LocalVariable(local) => {
                self.u16(local.index());
                self.bool(local.is_argument());
            }
        }
        Ok(())
    }

    fn change(&mut self, change: &EntryChange) -> Result<(), SyncError> {
        self.entry(change.target())?;
        self.u8(tristate_tag(change.deobf_name()) | tristate_tag(change.javadoc()) << 2);
        if let Some(name) = change.deobf_name().new_value() {
            self.string(name)?;
        }
        if let Some(javadoc) = change.javadoc().new_value() {
            self.string(javadoc)?;
        }
        Ok(())
    }

    /// The snapshot layout: root count, then every node in pre-order with its
    /// mapping and child count. Nodes without a mapping are written as blank.
    fn tree(&mut self, tree: &EntryTree) -> Result<(), SyncError> {
        let roots = i32::try_from(tree.root_nodes().len())
            .map_err(|_| SyncError::InvalidPacket("too many root nodes".to_string()))?;
        self.i32(roots);
        for node in tree.iter() {
            self.contextual_entry(node.entry())?;
            let (name, javadoc) = node
                .mapping()
                .map_or((None, None), |mapping| (mapping.target_name(), mapping.javadoc()));
            self.string(name.unwrap_or_default())?;
            self.string(javadoc.unwrap_or_default())?;
            self.len_u16(node.child_count(), "tree node")?;
        }
        Ok(())
    }

    fn server_message(&mut self, message: &ServerMessage) -> Result<(), SyncError> {
        self.u8(message.kind());
        self.string(message.user())?;
        match message {
            ServerMessage::Chat { message, .. } => self.string(message)?,
            ServerMessage::Connect { .. } | ServerMessage::Disconnect { .. } => {}
            ServerMessage::EditDocs { entry, .. }
            | ServerMessage::MarkDeobf { entry, .. }
            | ServerMessage::RemoveMapping { entry, .. } => self.entry(entry)?,
            ServerMessage::Rename {
                entry, new_name, ..
            } => {
                self.entry(entry)?;
                self.string(new_name)?;
            }
        }
        Ok(())
    }
}

fn entry_kind(entry: &Entry) -> u8 {
    match entry {
        Entry::Class(_) => ENTRY_CLASS,
        Entry::Field(_) => ENTRY_FIELD,
        Entry::Method(_) => ENTRY_METHOD,
        Entry::LocalVariable(_) => ENTRY_LOCAL_VARIABLE,
    }
}

fn tristate_tag<T>(change: &TristateChange<T>) -> u8 {
    match change {
        TristateChange::Unchanged => TRISTATE_UNCHANGED,
        TristateChange::Set(_) => TRISTATE_SET,
        TristateChange::Reset => TRISTATE_RESET,
    }
}

struct Decoder<'a, R> {
    reader: &'a mut R,
}

impl<R: AsyncRead + Unpin> Decoder<'_, R> {
    /// End of stream before a packet starts is a closed connection, not a broken packet.
    async fn packet_id(&mut self) -> Result<u8, SyncError> {
        match self.reader.read_u8().await {
            Ok(id) => Ok(id),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(SyncError::ConnectionClosed),
            Err(e) => Err(e.into()),
        }
    }

    async fn u8(&mut self) -> Result<u8, SyncError> {
        Ok(self.reader.read_u8().await?)
    }

    async fn u16(&mut self) -> Result<u16, SyncError> {
        Ok(self.reader.read_u16().await?)
    }

    async fn i32(&mut self) -> Result<i32, SyncError> {
        Ok(self.reader.read_i32().await?)
    }

    async fn bool(&mut self) -> Result<bool, SyncError> {
        Ok(self.u8().await? != 0)
    }

    async fn string(&mut self) -> Result<String, SyncError> {
        let len = self.u16().await?;
        let mut bytes = vec![0u8; len.into()];
        self.reader.read_exact(&mut bytes).await?;
        String::from_utf8(bytes).map_err(|e| SyncError::InvalidPacket(format!("invalid UTF-8 string: {e}")))
    }

    async fn password(&mut self) -> Result<String, SyncError> {
        let len = self.u8().await?;
        let mut units = Vec::with_capacity(len.into());
        for _ in 0..len {
            units.push(self.u16().await?);
        }
        String::from_utf16(&units).map_err(|e| SyncError::InvalidPacket(format!("invalid password: {e}")))
    }

    async fn entry(&mut self) -> Result<Entry, SyncError> {
        let mut kinds = Vec::new();
        loop {
            let kind = self.u8().await?;
            if kind > ENTRY_LOCAL_VARIABLE {
                return Err(SyncError::InvalidEntry(format!("unknown entry kind {kind}")));
            }
            kinds.push(kind);
            if !self.bool().await? {
                break;
            }
            if kinds.len() >= MAX_TREE_DEPTH {
                return Err(SyncError::TreeTooDeep { max: MAX_TREE_DEPTH });
            }
        }

        let mut entry = None;
        while let Some(kind) = kinds.pop() {
            entry = Some(self.entry_body(kind, entry).await?);
        }
        entry.ok_or_else(|| SyncError::InvalidEntry("empty entry".to_string()))
    }

    async fn contextual_entry(&mut self, parent: Option<Entry>) -> Result<Entry, SyncError> {
        let kind = self.u8().await?;
        self.entry_body(kind, parent).await
    }

    async fn entry_body(&mut self, kind: u8, parent: Option<Entry>) -> Result<Entry, SyncError> {
        let name = self.string().await?;
        let entry = match (kind, parent) {
            (ENTRY_CLASS, None) => ClassEntry::new(name).into(),
            (ENTRY_CLASS, Some(Entry::Class(outer))) => ClassEntry::inner(outer, name).into(),
            (ENTRY_FIELD, Some(Entry::Class(owner))) => {
                FieldEntry::new(owner, name, self.string().await?).into()
            }
            (ENTRY_METHOD, Some(Entry::Class(owner))) => {
                MethodEntry::new(owner, name, self.string().await?).into()
            }
            (ENTRY_LOCAL_VARIABLE, Some(Entry::Method(method))) => {
                let index = self.u16().await?;
                let is_argument = self.bool().await?;
                LocalVariableEntry::new(method, index, name, is_argument).into()
            }
            (kind @ ENTRY_CLASS..=ENTRY_LOCAL_VARIABLE, parent) => {
                return Err(SyncError::InvalidEntry(format!(
                    "entry '{name}' of kind {kind} cannot have parent {}",
                    parent.map_or_else(|| "none".to_string(), |p| p.to_string())
                )));
            }
            (kind, _) => return Err(SyncError::InvalidEntry(format!("unknown entry kind {kind}"))),
        };
        Ok(entry)
    }

    async fn tristate(&mut self, tag: u8) -> Result<TristateChange<String>, SyncError> {
        match tag {
            TRISTATE_UNCHANGED => Ok(TristateChange::Unchanged),
            TRISTATE_SET => Ok(TristateChange::Set(self.string().await?)),
            TRISTATE_RESET => Ok(TristateChange::Reset),
            other => Err(SyncError::InvalidPacket(format!("invalid change type {other}"))),
        }
    }

    async fn change(&mut self) -> Result<EntryChange, SyncError> {
        let target = self.entry().await?;
        let flags = self.u8().await?;
        if flags >> 4 != 0 {
            return Err(SyncError::InvalidPacket(format!("unsupported change flags {flags:#04x}")));
        }
        let deobf_name = self.tristate(flags & 0x3).await?;
        let javadoc = self.tristate(flags >> 2 & 0x3).await?;
        Ok(EntryChange::with_fields(target, deobf_name, javadoc))
    }

    /// Decode a snapshot. Blank nodes with children are intermediate nodes; a
    /// blank leaf is an entry explicitly left obfuscated.
    async fn tree(&mut self) -> Result<EntryTree, SyncError> {
        let roots = self.i32().await?;
        let mut roots_left = u32::try_from(roots)
            .map_err(|_| SyncError::InvalidPacket(format!("negative root count {roots}")))?;

        let mut tree = EntryTree::new();
        let mut stack: Vec<(Entry, u16)> = Vec::new();
        loop {
            while let Some((_, 0)) = stack.last() {
                stack.pop();
            }
            let parent = match stack.last_mut() {
                Some((parent, remaining)) => {
                    *remaining -= 1;
                    Some(parent.clone())
                }
                None if roots_left == 0 => break,
                None => {
                    roots_left -= 1;
                    None
                }
            };

            let entry = self.contextual_entry(parent).await?;
            let name = self.string().await?;
            let javadoc = self.string().await?;
            let children = self.u16().await?;

            let mapping = EntryMapping::new(Some(name), Some(javadoc), TokenType::User);
            if !mapping.is_default() || children == 0 {
                tree.insert(entry.clone(), mapping);
            }
            if children > 0 {
                if stack.len() + 1 >= MAX_TREE_DEPTH {
                    return Err(SyncError::TreeTooDeep { max: MAX_TREE_DEPTH });
                }
                stack.push((entry, children));
            }
        }
        Ok(tree)
    }

    async fn server_message(&mut self) -> Result<ServerMessage, SyncError> {
        let kind = self.u8().await?;
        let user = self.string().await?;
        let message = match kind {
            ServerMessage::CHAT => ServerMessage::Chat {
                user,
                message: self.string().await?,
            },
            ServerMessage::CONNECT => ServerMessage::Connect { user },
            ServerMessage::DISCONNECT => ServerMessage::Disconnect { user },
            ServerMessage::EDIT_DOCS => ServerMessage::EditDocs {
                user,
                entry: self.entry().await?,
            },
            ServerMessage::MARK_DEOBF => ServerMessage::MarkDeobf {
                user,
                entry: self.entry().await?,
            },
            ServerMessage::REMOVE_MAPPING => ServerMessage::RemoveMapping {
                user,
                entry: self.entry().await?,
            },
            ServerMessage::RENAME => ServerMessage::Rename {
                user,
                entry: self.entry().await?,
                new_name: self.string().await?,
            },
            other => return Err(SyncError::InvalidPacket(format!("unknown message kind {other}"))),
        };
        Ok(message)
    }
}
