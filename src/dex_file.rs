/* Dex file format structures */

use std::fs;
use std::path::Path;

use bitflags::bitflags;
use log::warn;
use serde::Serialize;

use crate::bytes::ByteCursor;
use crate::error::DexError;
use crate::meta::NodeMeta;

/* Constants */
pub const DEX_FILE_MAGIC: [u8; 8] = [ 0x64, 0x65, 0x78, 0x0a, 0x30, 0x33, 0x39, 0x00 ];
pub const DEX_MAGIC_PREFIX: [u8; 4] = [ 0x64, 0x65, 0x78, 0x0a ];
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;
pub const NO_INDEX: u32 = 0xffffffff;

/// Fixed size of the header record.
pub const HEADER_SIZE: usize = 0x70;

const STRING_ID_SIZE: u32 = 4;
const TYPE_ID_SIZE: u32 = 4;
const PROTO_ID_SIZE: u32 = 12;
const FIELD_ID_SIZE: u32 = 8;
const METHOD_ID_SIZE: u32 = 8;
const CLASS_DEF_SIZE: u32 = 32;
const MAP_ITEM_SIZE: u32 = 12;

bitflags! {
    /// Typed view over a raw `access_flags` word. Unknown bits are retained
    /// by the raw field on the owning record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

/// Any parsed structural unit carrying decode metadata.
pub trait Node
{
    fn meta(&self) -> &NodeMeta;

    fn is_corrupted(&self) -> bool
    {
        self.meta().corrupted
    }
}

macro_rules! impl_node {
    ($($t:ty),* $(,)?) => {
        $(impl Node for $t
        {
            fn meta(&self) -> &NodeMeta { &self.meta }
        })*
    };
}

impl_node!(
    Header, StringIdItem, StringDataItem, TypeIdItem, TypeItem, TypeList,
    ProtoIdItem, FieldIdItem, MethodIdItem, ClassDefItem, ClassDataItem,
    EncodedFieldItem, EncodedMethodItem, CodeItem, TryItem,
    EncodedTypeAddrPair, EncodedCatchHandler, EncodedCatchHandlerList,
    MapItem, MapList, DexFile,
);

impl<T> Node for Table<T>
{
    fn meta(&self) -> &NodeMeta
    {
        &self.meta
    }
}

fn clamped_count(meta: &mut NodeMeta, tag: &str, declared: u32, cap: usize) -> usize
{
    let declared = declared as usize;
    if declared > cap
    {
        warn!("[{}] declared count {} exceeds what the buffer can hold ({}), clamping", tag, declared, cap);
        meta.mark();
        cap
    }
    else
    {
        declared
    }
}

/// The header_item struct: a fixed 0x70-byte record at the front of the
/// file whose (size, offset) pairs drive the rest of the decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub meta: NodeMeta,
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Header
{
    pub fn read(cur: &ByteCursor, offset: u32) -> Header
    {
        let mut meta = NodeMeta::at(offset);
        let mut cur = meta.cursor_at(cur, offset);

        let magic: [u8; 8] = meta.take(cur.read_x(8)).try_into().unwrap_or_default();
        if magic[0..4] != DEX_MAGIC_PREFIX
        {
            warn!("[header] invalid magic value {:02x?}", magic);
            meta.mark();
        }

        let checksum = meta.take(cur.read_u4());
        let signature: [u8; 20] = meta.take(cur.read_x(20)).try_into().unwrap_or_default();
        let file_size = meta.take(cur.read_u4());
        let header_size = meta.take(cur.read_u4());

        let endian_tag = meta.take(cur.read_u4());
        if endian_tag != ENDIAN_CONSTANT && endian_tag != REVERSE_ENDIAN_CONSTANT
        {
            warn!("[header] unrecognised endian tag 0x{:08x}", endian_tag);
            meta.mark();
        }

        Header {
            magic,
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size: meta.take(cur.read_u4()),
            link_off: meta.take(cur.read_u4()),
            map_off: meta.take(cur.read_u4()),
            string_ids_size: meta.take(cur.read_u4()),
            string_ids_off: meta.take(cur.read_u4()),
            type_ids_size: meta.take(cur.read_u4()),
            type_ids_off: meta.take(cur.read_u4()),
            proto_ids_size: meta.take(cur.read_u4()),
            proto_ids_off: meta.take(cur.read_u4()),
            field_ids_size: meta.take(cur.read_u4()),
            field_ids_off: meta.take(cur.read_u4()),
            method_ids_size: meta.take(cur.read_u4()),
            method_ids_off: meta.take(cur.read_u4()),
            class_defs_size: meta.take(cur.read_u4()),
            class_defs_off: meta.take(cur.read_u4()),
            data_size: meta.take(cur.read_u4()),
            data_off: meta.take(cur.read_u4()),
            meta,
        }
    }
}

/// The string_id_item struct. The referenced string data is decoded
/// eagerly and owned here; an offset of 0 means absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringIdItem {
    pub meta: NodeMeta,
    pub string_data_off: u32,
    pub data: Option<StringDataItem>,
}

impl StringIdItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> StringIdItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut id = meta.cursor_at(cur, offset);
        let string_data_off = meta.take(id.read_u4());

        let data = if string_data_off != 0
        {
            let d = StringDataItem::read(cur, string_data_off);
            meta.absorb(&d.meta);
            Some(d)
        }
        else { None };

        StringIdItem { meta, string_data_off, data }
    }
}

/// The string_data_item struct: a uleb128 length prefix followed by that
/// many payload bytes. The payload is kept raw — malware routinely carries
/// strings that are not valid MUTF-8, and the broken bytes are themselves
/// a signal worth preserving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringDataItem {
    pub meta: NodeMeta,
    pub utf16_size: u32,
    pub data: Vec<u8>,
}

impl StringDataItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> StringDataItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut cur = meta.cursor_at(cur, offset);

        let utf16_size = meta.take(cur.read_uleb128());
        let count = clamped_count(&mut meta, "stringdata", utf16_size, cur.remaining());
        let data = meta.take(cur.read_x(count));

        StringDataItem { meta, utf16_size, data }
    }

    /// Best-effort MUTF-8 decode of the raw payload.
    pub fn to_string(&self) -> Result<String, DexError>
    {
        match cesu8::from_java_cesu8(&self.data)
        {
            Ok(s) => Ok(s.into_owned()),
            Err(_) => Err(DexError::new("string data failed MUTF-8 conversion")),
        }
    }
}

/// The type_id_item struct: an index into the string table holding the
/// type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeIdItem {
    pub meta: NodeMeta,
    pub descriptor_idx: u32,
}

impl TypeIdItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> TypeIdItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut cur = meta.cursor_at(cur, offset);
        let descriptor_idx = meta.take(cur.read_u4());
        TypeIdItem { meta, descriptor_idx }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeItem {
    pub meta: NodeMeta,
    pub type_idx: u16,
}

impl TypeItem
{
    fn read(run: &mut ByteCursor) -> TypeItem
    {
        let mut meta = NodeMeta::at(run.position() as u32);
        let type_idx = meta.take(run.read_u2());
        TypeItem { meta, type_idx }
    }
}

/// The type_list struct: a count followed by that many 16-bit type
/// indices. Used for proto parameter lists and class interface lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeList {
    pub meta: NodeMeta,
    pub size: u32,
    pub list: Vec<TypeItem>,
}

impl TypeList
{
    pub fn read(cur: &ByteCursor, offset: u32) -> TypeList
    {
        let mut meta = NodeMeta::at(offset);
        let mut cur = meta.cursor_at(cur, offset);

        let size = meta.take(cur.read_u4());
        let count = clamped_count(&mut meta, "typelist", size, cur.remaining() / 2);

        let mut list = Vec::with_capacity(count);
        for _ in 0..count
        {
            let item = TypeItem::read(&mut cur);
            meta.absorb(&item.meta);
            list.push(item);
        }

        TypeList { meta, size, list }
    }
}

/// The proto_id_item struct. The parameter type list is decoded eagerly;
/// an offset of 0 means the prototype takes no parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtoIdItem {
    pub meta: NodeMeta,
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters_off: u32,
    pub parameters: Option<TypeList>,
}

impl ProtoIdItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> ProtoIdItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut id = meta.cursor_at(cur, offset);

        let shorty_idx = meta.take(id.read_u4());
        let return_type_idx = meta.take(id.read_u4());
        let parameters_off = meta.take(id.read_u4());

        let parameters = if parameters_off != 0
        {
            let tl = TypeList::read(cur, parameters_off);
            meta.absorb(&tl.meta);
            Some(tl)
        }
        else { None };

        ProtoIdItem { meta, shorty_idx, return_type_idx, parameters_off, parameters }
    }
}

/// The field_id_item struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldIdItem {
    pub meta: NodeMeta,
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

impl FieldIdItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> FieldIdItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut cur = meta.cursor_at(cur, offset);
        FieldIdItem {
            class_idx: meta.take(cur.read_u2()),
            type_idx: meta.take(cur.read_u2()),
            name_idx: meta.take(cur.read_u4()),
            meta,
        }
    }
}

/// The method_id_item struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodIdItem {
    pub meta: NodeMeta,
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}

impl MethodIdItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> MethodIdItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut cur = meta.cursor_at(cur, offset);
        MethodIdItem {
            class_idx: meta.take(cur.read_u2()),
            proto_idx: meta.take(cur.read_u2()),
            name_idx: meta.take(cur.read_u4()),
            meta,
        }
    }
}

/// One field entry of a class_data_item run. `field_idx` is the
/// reconstructed index (cumulative sum of the stored diffs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedFieldItem {
    pub meta: NodeMeta,
    pub field_idx: u32,
    pub access_flags: u32,
}

impl EncodedFieldItem
{
    fn read(run: &mut ByteCursor, prev: &mut u32, first: bool) -> EncodedFieldItem
    {
        let mut meta = NodeMeta::at(run.position() as u32);

        let diff = meta.take(run.read_uleb128());
        if !first && diff == 0
        {
            warn!("[classdata] field index diff of 0 breaks ascending order at 0x{:x}", meta.offset);
            meta.mark();
        }
        *prev = prev.wrapping_add(diff);

        EncodedFieldItem {
            field_idx: *prev,
            access_flags: meta.take(run.read_uleb128()),
            meta,
        }
    }

    pub fn flags(&self) -> AccessFlags
    {
        AccessFlags::from_bits_retain(self.access_flags)
    }
}

/// One method entry of a class_data_item run. A `code_off` of 0 is the
/// documented "no code" sentinel for abstract and native methods, not
/// corruption; otherwise the code item is decoded eagerly and owned here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedMethodItem {
    pub meta: NodeMeta,
    pub method_idx: u32,
    pub access_flags: u32,
    pub code_off: u32,
    pub code: Option<CodeItem>,
}

impl EncodedMethodItem
{
    fn read(cur: &ByteCursor, run: &mut ByteCursor, prev: &mut u32, first: bool) -> EncodedMethodItem
    {
        let mut meta = NodeMeta::at(run.position() as u32);

        let diff = meta.take(run.read_uleb128());
        if !first && diff == 0
        {
            warn!("[classdata] method index diff of 0 breaks ascending order at 0x{:x}", meta.offset);
            meta.mark();
        }
        *prev = prev.wrapping_add(diff);

        let access_flags = meta.take(run.read_uleb128());
        let code_off = meta.take(run.read_uleb128());

        let code = if code_off != 0
        {
            let ci = CodeItem::read(cur, code_off);
            meta.absorb(&ci.meta);
            Some(ci)
        }
        else { None };

        EncodedMethodItem { method_idx: *prev, access_flags, code_off, code, meta }
    }

    pub fn flags(&self) -> AccessFlags
    {
        AccessFlags::from_bits_retain(self.access_flags)
    }
}

/// The class_data_item struct: four uleb128 counts followed by that many
/// encoded field/method records in that fixed order, indices
/// delta-encoded within each run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDataItem {
    pub meta: NodeMeta,
    pub static_fields: Vec<EncodedFieldItem>,
    pub instance_fields: Vec<EncodedFieldItem>,
    pub direct_methods: Vec<EncodedMethodItem>,
    pub virtual_methods: Vec<EncodedMethodItem>,
}

impl ClassDataItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> ClassDataItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut run = meta.cursor_at(cur, offset);

        let static_fields_size = meta.take(run.read_uleb128());
        let instance_fields_size = meta.take(run.read_uleb128());
        let direct_methods_size = meta.take(run.read_uleb128());
        let virtual_methods_size = meta.take(run.read_uleb128());

        // A field entry encodes to at least 2 bytes and a method entry to
        // at least 3, which bounds how many the remaining buffer can hold.
        let field_cap = run.remaining() / 2;
        let method_cap = run.remaining() / 3;
        let static_count = clamped_count(&mut meta, "classdata", static_fields_size, field_cap);
        let instance_count = clamped_count(&mut meta, "classdata", instance_fields_size, field_cap);
        let direct_count = clamped_count(&mut meta, "classdata", direct_methods_size, method_cap);
        let virtual_count = clamped_count(&mut meta, "classdata", virtual_methods_size, method_cap);

        let mut static_fields = Vec::with_capacity(static_count);
        let mut prev = 0;
        for i in 0..static_count
        {
            let f = EncodedFieldItem::read(&mut run, &mut prev, i == 0);
            meta.absorb(&f.meta);
            static_fields.push(f);
        }

        let mut instance_fields = Vec::with_capacity(instance_count);
        prev = 0;
        for i in 0..instance_count
        {
            let f = EncodedFieldItem::read(&mut run, &mut prev, i == 0);
            meta.absorb(&f.meta);
            instance_fields.push(f);
        }

        let mut direct_methods = Vec::with_capacity(direct_count);
        prev = 0;
        for i in 0..direct_count
        {
            let m = EncodedMethodItem::read(cur, &mut run, &mut prev, i == 0);
            meta.absorb(&m.meta);
            direct_methods.push(m);
        }

        let mut virtual_methods = Vec::with_capacity(virtual_count);
        prev = 0;
        for i in 0..virtual_count
        {
            let m = EncodedMethodItem::read(cur, &mut run, &mut prev, i == 0);
            meta.absorb(&m.meta);
            virtual_methods.push(m);
        }

        ClassDataItem { meta, static_fields, instance_fields, direct_methods, virtual_methods }
    }
}

/// The try_item struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TryItem {
    pub meta: NodeMeta,
    pub start_addr: u32,
    pub insn_count: u16,
    pub handler_off: u16, // offset (in bytes) into the encoded_catch_handler_list
}

impl TryItem
{
    fn read(run: &mut ByteCursor) -> TryItem
    {
        let mut meta = NodeMeta::at(run.position() as u32);
        TryItem {
            start_addr: meta.take(run.read_u4()),
            insn_count: meta.take(run.read_u2()),
            handler_off: meta.take(run.read_u2()),
            meta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedTypeAddrPair {
    pub meta: NodeMeta,
    pub type_idx: u32,
    pub addr: u32,
}

impl EncodedTypeAddrPair
{
    fn read(run: &mut ByteCursor) -> EncodedTypeAddrPair
    {
        let mut meta = NodeMeta::at(run.position() as u32);
        EncodedTypeAddrPair {
            type_idx: meta.take(run.read_uleb128()),
            addr: meta.take(run.read_uleb128()),
            meta,
        }
    }
}

/// The encoded_catch_handler struct. The sign of `size` carries the
/// catch-all convention: a positive size means that many typed handlers
/// and no catch-all; zero or negative means `abs(size)` typed handlers
/// followed by one catch-all address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedCatchHandler {
    pub meta: NodeMeta,
    pub size: i32,
    pub handlers: Vec<EncodedTypeAddrPair>,
    pub catch_all_addr: Option<u32>,
}

impl EncodedCatchHandler
{
    pub fn read(run: &mut ByteCursor) -> EncodedCatchHandler
    {
        let mut meta = NodeMeta::at(run.position() as u32);

        let size = meta.take(run.read_sleb128());
        let count = clamped_count(&mut meta, "catchhandler", size.unsigned_abs(), run.remaining() / 2);

        let mut handlers = Vec::with_capacity(count);
        for _ in 0..count
        {
            let pair = EncodedTypeAddrPair::read(run);
            meta.absorb(&pair.meta);
            handlers.push(pair);
        }

        let catch_all_addr = if size <= 0 { Some(meta.take(run.read_uleb128())) } else { None };

        EncodedCatchHandler { meta, size, handlers, catch_all_addr }
    }
}

/// The encoded_catch_handler_list struct, located immediately after a code
/// item's try array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedCatchHandlerList {
    pub meta: NodeMeta,
    pub size: u32,
    pub list: Vec<EncodedCatchHandler>,
}

impl EncodedCatchHandlerList
{
    fn read(run: &mut ByteCursor) -> EncodedCatchHandlerList
    {
        let mut meta = NodeMeta::at(run.position() as u32);

        let size = meta.take(run.read_uleb128());
        let count = clamped_count(&mut meta, "catchhandlerlist", size, run.remaining());

        let mut list = Vec::with_capacity(count);
        for _ in 0..count
        {
            if run.remaining() == 0
            {
                meta.mark();
                break;
            }
            let handler = EncodedCatchHandler::read(run);
            meta.absorb(&handler.meta);
            list.push(handler);
        }

        EncodedCatchHandlerList { meta, size, list }
    }
}

/// The code_item struct. Instruction words are stored as opaque 16-bit
/// units; disassembly is a consumer concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeItem {
    pub meta: NodeMeta,
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: u32,
    pub insns_size: u32,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    pub handlers: Option<EncodedCatchHandlerList>,
}

impl CodeItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> CodeItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut run = meta.cursor_at(cur, offset);

        let registers_size = meta.take(run.read_u2());
        let ins_size = meta.take(run.read_u2());
        let outs_size = meta.take(run.read_u2());
        let tries_size = meta.take(run.read_u2());
        let debug_info_off = meta.take(run.read_u4());
        let insns_size = meta.take(run.read_u4());

        let insn_count = clamped_count(&mut meta, "codeitem", insns_size, run.remaining() / 2);
        let mut insns = Vec::with_capacity(insn_count);
        for _ in 0..insn_count
        {
            insns.push(meta.take(run.read_u2()));
        }

        let mut tries = Vec::new();
        let mut handlers = None;

        if tries_size > 0
        {
            // 2-byte alignment padding when the instruction array has an
            // odd number of units
            if (insns_size & 1) != 0
            {
                let padding = meta.take(run.read_u2());
                if padding != 0
                {
                    warn!("[codeitem] non-zero padding 0x{:04x} at 0x{:x}", padding, run.position() - 2);
                }
            }

            let try_count = clamped_count(&mut meta, "codeitem", tries_size as u32, run.remaining() / 8);
            tries.reserve(try_count);
            for _ in 0..try_count
            {
                let t = TryItem::read(&mut run);
                meta.absorb(&t.meta);
                tries.push(t);
            }

            let list = EncodedCatchHandlerList::read(&mut run);
            meta.absorb(&list.meta);
            handlers = Some(list);
        }

        CodeItem {
            meta,
            registers_size,
            ins_size,
            outs_size,
            tries_size,
            debug_info_off,
            insns_size,
            insns,
            tries,
            handlers,
        }
    }
}

/// The class_def_item struct. Interfaces and class data are decoded
/// eagerly through their offsets; annotations and static values are kept
/// as raw offsets since their targets are outside the modeled surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDefItem {
    pub meta: NodeMeta,
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub interfaces_off: u32,
    pub source_file_idx: u32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
    pub interfaces: Option<TypeList>,
    pub class_data: Option<ClassDataItem>,
}

impl ClassDefItem
{
    pub fn read(cur: &ByteCursor, offset: u32) -> ClassDefItem
    {
        let mut meta = NodeMeta::at(offset);
        let mut id = meta.cursor_at(cur, offset);

        let class_idx = meta.take(id.read_u4());
        let access_flags = meta.take(id.read_u4());
        let superclass_idx = meta.take(id.read_u4());
        let interfaces_off = meta.take(id.read_u4());
        let source_file_idx = meta.take(id.read_u4());
        let annotations_off = meta.take(id.read_u4());
        let class_data_off = meta.take(id.read_u4());
        let static_values_off = meta.take(id.read_u4());

        let interfaces = if interfaces_off != 0
        {
            let tl = TypeList::read(cur, interfaces_off);
            meta.absorb(&tl.meta);
            Some(tl)
        }
        else { None };

        let class_data = if class_data_off != 0
        {
            let cd = ClassDataItem::read(cur, class_data_off);
            meta.absorb(&cd.meta);
            Some(cd)
        }
        else { None };

        ClassDefItem {
            meta,
            class_idx,
            access_flags,
            superclass_idx,
            interfaces_off,
            source_file_idx,
            annotations_off,
            class_data_off,
            static_values_off,
            interfaces,
            class_data,
        }
    }

    pub fn flags(&self) -> AccessFlags
    {
        AccessFlags::from_bits_retain(self.access_flags)
    }
}

/// The map_item struct: one section descriptor of the file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MapItem {
    pub meta: NodeMeta,
    pub item_type: u16,
    pub unused: u16,
    pub size: u32,
    pub offset: u32,
}

impl MapItem
{
    fn read(run: &mut ByteCursor) -> MapItem
    {
        let mut meta = NodeMeta::at(run.position() as u32);
        MapItem {
            item_type: meta.take(run.read_u2()),
            unused: meta.take(run.read_u2()),
            size: meta.take(run.read_u4()),
            offset: meta.take(run.read_u4()),
            meta,
        }
    }
}

/// The map_list struct: the file's own description of every section it
/// contains, including ones not otherwise modeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapList {
    pub meta: NodeMeta,
    pub size: u32,
    pub list: Vec<MapItem>,
}

impl MapList
{
    pub fn read(cur: &ByteCursor, offset: u32) -> MapList
    {
        let mut meta = NodeMeta::at(offset);
        let mut run = meta.cursor_at(cur, offset);

        let size = meta.take(run.read_u4());
        let count = clamped_count(&mut meta, "maplist", size, run.remaining() / MAP_ITEM_SIZE as usize);

        let mut list = Vec::with_capacity(count);
        for _ in 0..count
        {
            let item = MapItem::read(&mut run);
            meta.absorb(&item.meta);
            list.push(item);
        }

        MapList { meta, size, list }
    }
}

/// A header-declared table: an ordered sequence of records plus a
/// table-level corruption marker. A table whose declared offset or size is
/// inconsistent with the buffer decodes as empty-and-marked rather than
/// failing the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table<T> {
    pub meta: NodeMeta,
    pub items: Vec<T>,
}

impl<T> Table<T>
{
    pub fn len(&self) -> usize
    {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T>
    {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T>
    {
        self.items.iter()
    }
}

impl<T> std::ops::Index<usize> for Table<T>
{
    type Output = T;

    fn index(&self, index: usize) -> &T
    {
        &self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a Table<T>
{
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.items.iter()
    }
}

fn read_table<T: Node>(
    cur: &ByteCursor,
    name: &str,
    size: u32,
    off: u32,
    record_size: u32,
    read: fn(&ByteCursor, u32) -> T,
) -> Table<T>
{
    let mut table = Table { meta: NodeMeta::at(off), items: Vec::new() };

    if size == 0
    {
        return table;
    }

    if off as usize >= cur.len()
    {
        warn!("[{}] table offset 0x{:x} is outside the {} byte buffer", name, off, cur.len());
        table.meta.mark();
        return table;
    }

    let cap = (cur.len() - off as usize) / record_size as usize;
    let count = clamped_count(&mut table.meta, name, size, cap);

    table.items.reserve(count);
    for i in 0..count
    {
        let item = read(cur, off + (i as u32) * record_size);
        table.meta.absorb(item.meta());
        table.items.push(item);
    }

    table
}

/// The decoded root: the header plus every table it declares, owned
/// transitively. Returned even when sub-nodes are corrupted; callers
/// inspect per-node metadata to decide how much to trust each part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DexFile {
    pub meta: NodeMeta,
    pub header: Header,
    pub string_ids: Table<StringIdItem>,
    pub type_ids: Table<TypeIdItem>,
    pub proto_ids: Table<ProtoIdItem>,
    pub field_ids: Table<FieldIdItem>,
    pub method_ids: Table<MethodIdItem>,
    pub class_defs: Table<ClassDefItem>,
    pub map_list: Option<MapList>,
}

impl DexFile
{
    /// Decode a DEX image from the start of `bytes`.
    ///
    /// The only fatal failures are a buffer too small to hold a header and
    /// an out-of-range start offset (`read_at`); everything else decodes
    /// best-effort with per-node corruption marks.
    pub fn read(bytes: &[u8]) -> Result<DexFile, DexError>
    {
        Self::read_at(bytes, 0)
    }

    /// Decode a DEX image embedded at `base` within a larger container.
    /// Offsets inside the file are relative to `base`.
    pub fn read_at(bytes: &[u8], base: u32) -> Result<DexFile, DexError>
    {
        let view = match bytes.get(base as usize..)
        {
            Some(v) => v,
            None => fail!("start offset {} is beyond the end of the {} byte buffer", base, bytes.len()),
        };
        if view.len() < HEADER_SIZE
        {
            fail!("{} bytes is too small to hold a DEX header", view.len());
        }

        let cur = ByteCursor::new(view);
        let mut meta = NodeMeta::at(base);

        let header = Header::read(&cur, 0);
        meta.absorb(&header.meta);

        let string_ids = read_table(&cur, "string_ids", header.string_ids_size, header.string_ids_off, STRING_ID_SIZE, StringIdItem::read);
        let type_ids = read_table(&cur, "type_ids", header.type_ids_size, header.type_ids_off, TYPE_ID_SIZE, TypeIdItem::read);
        let proto_ids = read_table(&cur, "proto_ids", header.proto_ids_size, header.proto_ids_off, PROTO_ID_SIZE, ProtoIdItem::read);
        let field_ids = read_table(&cur, "field_ids", header.field_ids_size, header.field_ids_off, FIELD_ID_SIZE, FieldIdItem::read);
        let method_ids = read_table(&cur, "method_ids", header.method_ids_size, header.method_ids_off, METHOD_ID_SIZE, MethodIdItem::read);
        let class_defs = read_table(&cur, "class_defs", header.class_defs_size, header.class_defs_off, CLASS_DEF_SIZE, ClassDefItem::read);

        meta.absorb(&string_ids.meta);
        meta.absorb(&type_ids.meta);
        meta.absorb(&proto_ids.meta);
        meta.absorb(&field_ids.meta);
        meta.absorb(&method_ids.meta);
        meta.absorb(&class_defs.meta);

        let map_list = if header.map_off != 0
        {
            let m = MapList::read(&cur, header.map_off);
            meta.absorb(&m.meta);
            Some(m)
        }
        else { None };

        Ok(DexFile {
            meta,
            header,
            string_ids,
            type_ids,
            proto_ids,
            field_ids,
            method_ids,
            class_defs,
            map_list,
        })
    }

    /// Load and decode a DEX file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DexFile, DexError>
    {
        let bytes = match fs::read(path.as_ref())
        {
            Ok(b) => b,
            Err(e) => fail!("failed to read {}: {}", path.as_ref().display(), e),
        };
        DexFile::read(&bytes)
    }

    /// True if any node anywhere in the decoded tree is corrupted.
    pub fn is_corrupted(&self) -> bool
    {
        self.meta.corrupted
    }

    /// The string data referenced by string index `idx`, if present.
    pub fn string(&self, idx: u32) -> Option<&StringDataItem>
    {
        self.string_ids.get(idx as usize)?.data.as_ref()
    }

    /// The descriptor string of type index `idx`, if resolvable.
    pub fn type_descriptor(&self, idx: u32) -> Option<&StringDataItem>
    {
        let type_id = self.type_ids.get(idx as usize)?;
        self.string(type_id.descriptor_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leb::{encode_sleb128, encode_uleb128};

    fn push_u2(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u4(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_uleb(buf: &mut Vec<u8>, v: u32) {
        buf.extend(encode_uleb128(v));
    }

    fn push_sleb(buf: &mut Vec<u8>, v: i32) {
        buf.extend(encode_sleb128(v));
    }

    /// Assemble a 0x70-byte header; `pairs` are the (size, offset) pairs
    /// for string/type/proto/field/method/class tables in header order.
    fn build_header(pairs: [(u32, u32); 6], map_off: u32, file_size: u32) -> Vec<u8> {
        let mut h = Vec::with_capacity(HEADER_SIZE);
        h.extend_from_slice(&DEX_FILE_MAGIC);
        push_u4(&mut h, 0xCAFE_F00D); // checksum, not validated
        h.extend_from_slice(&[0u8; 20]); // signature
        push_u4(&mut h, file_size);
        push_u4(&mut h, HEADER_SIZE as u32);
        push_u4(&mut h, ENDIAN_CONSTANT);
        push_u4(&mut h, 0); // link_size
        push_u4(&mut h, 0); // link_off
        push_u4(&mut h, map_off);
        for (size, off) in pairs {
            push_u4(&mut h, size);
            push_u4(&mut h, off);
        }
        push_u4(&mut h, 0); // data_size
        push_u4(&mut h, 0); // data_off
        assert_eq!(h.len(), HEADER_SIZE);
        h
    }

    fn serialize_header(h: &Header) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&h.magic);
        push_u4(&mut out, h.checksum);
        out.extend_from_slice(&h.signature);
        push_u4(&mut out, h.file_size);
        push_u4(&mut out, h.header_size);
        push_u4(&mut out, h.endian_tag);
        push_u4(&mut out, h.link_size);
        push_u4(&mut out, h.link_off);
        push_u4(&mut out, h.map_off);
        push_u4(&mut out, h.string_ids_size);
        push_u4(&mut out, h.string_ids_off);
        push_u4(&mut out, h.type_ids_size);
        push_u4(&mut out, h.type_ids_off);
        push_u4(&mut out, h.proto_ids_size);
        push_u4(&mut out, h.proto_ids_off);
        push_u4(&mut out, h.field_ids_size);
        push_u4(&mut out, h.field_ids_off);
        push_u4(&mut out, h.method_ids_size);
        push_u4(&mut out, h.method_ids_off);
        push_u4(&mut out, h.class_defs_size);
        push_u4(&mut out, h.class_defs_off);
        push_u4(&mut out, h.data_size);
        push_u4(&mut out, h.data_off);
        out
    }

    #[test]
    fn test_header_roundtrip() {
        let pairs = [(2, 0x70), (3, 0x80), (4, 0x90), (5, 0xA0), (6, 0xB0), (7, 0xC0)];
        let bytes = build_header(pairs, 0xD0, 0x1000);

        let header = Header::read(&ByteCursor::new(&bytes), 0);
        assert!(!header.meta.corrupted);
        assert_eq!(header.magic, DEX_FILE_MAGIC);
        assert_eq!(header.endian_tag, ENDIAN_CONSTANT);
        assert_eq!(header.string_ids_size, 2);
        assert_eq!(header.string_ids_off, 0x70);
        assert_eq!(header.class_defs_size, 7);
        assert_eq!(header.class_defs_off, 0xC0);
        assert_eq!(header.map_off, 0xD0);

        // every (size, offset) pair survives parse -> re-serialize
        assert_eq!(serialize_header(&header), bytes);
    }

    #[test]
    fn test_header_bad_magic_is_marked_not_rejected() {
        let mut bytes = build_header([(0, 0); 6], 0, 0x70);
        bytes[0] = b'p';

        let header = Header::read(&ByteCursor::new(&bytes), 0);
        assert!(header.meta.corrupted);
        // the rest of the record is still decoded best-effort
        assert_eq!(header.checksum, 0xCAFE_F00D);
        assert_eq!(header.header_size, HEADER_SIZE as u32);
    }

    #[test]
    fn test_truncated_buffer_is_fatal() {
        assert!(DexFile::read(&[0u8; 50]).is_err());
        assert!(DexFile::read(&[]).is_err());
        // a zeroed header-sized buffer decodes (corrupted), it does not fail
        let dex = DexFile::read(&[0u8; HEADER_SIZE]).unwrap();
        assert!(dex.is_corrupted());
    }

    #[test]
    fn test_read_at_embedded_and_out_of_range() {
        let mut container = vec![0xEEu8; 16];
        container.extend(build_header([(0, 0); 6], 0, HEADER_SIZE as u32));

        let dex = DexFile::read_at(&container, 16).unwrap();
        assert!(!dex.header.meta.corrupted);
        assert_eq!(dex.meta.offset, 16);

        // base past the end of the buffer is the other fatal case
        assert!(DexFile::read_at(&container, container.len() as u32 + 1).is_err());
        // base in range but with less than a header remaining
        assert!(DexFile::read_at(&container, 20).is_err());
    }

    #[test]
    fn test_string_id_table() {
        let mut buf = build_header([(2, 112), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)], 0, 320);
        push_u4(&mut buf, 200);
        push_u4(&mut buf, 300);
        buf.resize(200, 0);
        push_uleb(&mut buf, 5);
        buf.extend_from_slice(b"hello");
        buf.resize(300, 0);
        push_uleb(&mut buf, 2);
        buf.extend_from_slice(b"hi");
        buf.resize(320, 0);

        let dex = DexFile::read(&buf).unwrap();
        assert!(!dex.is_corrupted());
        assert_eq!(dex.string_ids.len(), 2);
        assert_eq!(dex.string_ids[0].string_data_off, 200);
        assert_eq!(dex.string_ids[1].string_data_off, 300);
        assert!(!dex.string_ids[0].meta.corrupted);
        assert!(!dex.string_ids[1].meta.corrupted);
        assert_eq!(dex.string(0).unwrap().to_string().unwrap(), "hello");
        assert_eq!(dex.string(1).unwrap().to_string().unwrap(), "hi");
    }

    #[test]
    fn test_string_data_truncated_payload() {
        // declares 100 payload bytes but only 2 are present
        let mut buf = vec![];
        push_uleb(&mut buf, 100);
        buf.extend_from_slice(b"ab");

        let s = StringDataItem::read(&ByteCursor::new(&buf), 0);
        assert!(s.meta.corrupted);
        assert_eq!(s.utf16_size, 100);
        assert_eq!(s.data, b"ab");
    }

    #[test]
    fn test_class_data_delta_decode() {
        let mut buf = vec![];
        push_uleb(&mut buf, 2); // static fields
        push_uleb(&mut buf, 1); // instance fields
        push_uleb(&mut buf, 0); // direct methods
        push_uleb(&mut buf, 0); // virtual methods
        push_uleb(&mut buf, 1); // diff 1 -> index 1
        push_uleb(&mut buf, 0x10);
        push_uleb(&mut buf, 1); // diff 1 -> index 2
        push_uleb(&mut buf, 0x12);
        push_uleb(&mut buf, 5); // diff 5 -> index 5
        push_uleb(&mut buf, 0x02);

        let cd = ClassDataItem::read(&ByteCursor::new(&buf), 0);
        assert!(!cd.meta.corrupted);
        assert_eq!(cd.static_fields.len(), 2);
        assert_eq!(cd.static_fields[0].field_idx, 1);
        assert_eq!(cd.static_fields[1].field_idx, 2);
        assert_eq!(cd.instance_fields[0].field_idx, 5);
        assert!(cd.static_fields[1].flags().contains(AccessFlags::FINAL));

        // re-encoding the reconstructed indices as diffs and decoding
        // again yields the same indices
        let mut rebuilt = vec![];
        push_uleb(&mut rebuilt, cd.static_fields.len() as u32);
        push_uleb(&mut rebuilt, cd.instance_fields.len() as u32);
        push_uleb(&mut rebuilt, 0);
        push_uleb(&mut rebuilt, 0);
        let mut prev = 0;
        for f in &cd.static_fields {
            push_uleb(&mut rebuilt, f.field_idx - prev);
            push_uleb(&mut rebuilt, f.access_flags);
            prev = f.field_idx;
        }
        prev = 0;
        for f in &cd.instance_fields {
            push_uleb(&mut rebuilt, f.field_idx - prev);
            push_uleb(&mut rebuilt, f.access_flags);
            prev = f.field_idx;
        }

        let again = ClassDataItem::read(&ByteCursor::new(&rebuilt), 0);
        let indices = |fields: &[EncodedFieldItem]| fields.iter().map(|f| f.field_idx).collect::<Vec<_>>();
        assert_eq!(indices(&again.static_fields), indices(&cd.static_fields));
        assert_eq!(indices(&again.instance_fields), indices(&cd.instance_fields));
    }

    #[test]
    fn test_class_data_zero_diff_marks_corruption() {
        let mut buf = vec![];
        push_uleb(&mut buf, 2);
        push_uleb(&mut buf, 0);
        push_uleb(&mut buf, 0);
        push_uleb(&mut buf, 0);
        push_uleb(&mut buf, 1); // index 1
        push_uleb(&mut buf, 0);
        push_uleb(&mut buf, 0); // diff 0 after the first entry: order violation
        push_uleb(&mut buf, 0);

        let cd = ClassDataItem::read(&ByteCursor::new(&buf), 0);
        assert!(cd.meta.corrupted);
        assert!(!cd.static_fields[0].meta.corrupted);
        assert!(cd.static_fields[1].meta.corrupted);
        // decoding continued with the malformed value as given
        assert_eq!(cd.static_fields[0].field_idx, 1);
        assert_eq!(cd.static_fields[1].field_idx, 1);
    }

    #[test]
    fn test_catch_handler_positive_size() {
        let mut buf = vec![];
        push_sleb(&mut buf, 2);
        push_uleb(&mut buf, 3); // type_idx
        push_uleb(&mut buf, 0x100); // addr
        push_uleb(&mut buf, 7);
        push_uleb(&mut buf, 0x2222);

        let h = EncodedCatchHandler::read(&mut ByteCursor::new(&buf));
        assert!(!h.meta.corrupted);
        assert_eq!(h.size, 2);
        assert_eq!(h.handlers.len(), 2);
        assert_eq!(h.handlers[0].type_idx, 3);
        assert_eq!(h.handlers[0].addr, 0x100);
        assert_eq!(h.handlers[1].type_idx, 7);
        assert_eq!(h.catch_all_addr, None);
    }

    #[test]
    fn test_catch_handler_negative_size_has_catch_all() {
        let mut buf = vec![];
        push_sleb(&mut buf, -1);
        push_uleb(&mut buf, 42);
        push_uleb(&mut buf, 0xABCD);
        push_uleb(&mut buf, 0x1234); // catch-all addr

        let h = EncodedCatchHandler::read(&mut ByteCursor::new(&buf));
        assert!(!h.meta.corrupted);
        assert_eq!(h.size, -1);
        assert_eq!(h.handlers.len(), 1);
        assert_eq!(h.catch_all_addr, Some(0x1234));
    }

    #[test]
    fn test_catch_handler_zero_size_has_catch_all() {
        let mut buf = vec![];
        push_sleb(&mut buf, 0);
        push_uleb(&mut buf, 9); // catch-all addr

        let h = EncodedCatchHandler::read(&mut ByteCursor::new(&buf));
        assert!(!h.meta.corrupted);
        assert_eq!(h.handlers.len(), 0);
        assert_eq!(h.catch_all_addr, Some(9));
    }

    #[test]
    fn test_code_item_with_tries_and_padding() {
        let mut buf = vec![];
        push_u2(&mut buf, 2); // registers
        push_u2(&mut buf, 1); // ins
        push_u2(&mut buf, 0); // outs
        push_u2(&mut buf, 1); // tries
        push_u4(&mut buf, 0); // debug_info_off
        push_u4(&mut buf, 3); // insns_size, odd -> padding follows
        push_u2(&mut buf, 0x0001);
        push_u2(&mut buf, 0x0002);
        push_u2(&mut buf, 0x000E);
        push_u2(&mut buf, 0); // alignment padding
        push_u4(&mut buf, 0); // try start_addr
        push_u2(&mut buf, 3); // insn_count
        push_u2(&mut buf, 0); // handler_off
        push_uleb(&mut buf, 1); // one handler in the list
        push_sleb(&mut buf, 1);
        push_uleb(&mut buf, 4); // type_idx
        push_uleb(&mut buf, 2); // addr

        let ci = CodeItem::read(&ByteCursor::new(&buf), 0);
        assert!(!ci.meta.corrupted);
        assert_eq!(ci.registers_size, 2);
        assert_eq!(ci.insns, vec![0x0001, 0x0002, 0x000E]);
        assert_eq!(ci.tries.len(), 1);
        assert_eq!(ci.tries[0].insn_count, 3);
        let handlers = ci.handlers.as_ref().unwrap();
        assert_eq!(handlers.list.len(), 1);
        assert_eq!(handlers.list[0].handlers[0].type_idx, 4);
        assert_eq!(handlers.list[0].catch_all_addr, None);
    }

    #[test]
    fn test_table_offset_beyond_buffer() {
        let mut buf = build_header([(4, 0x10000), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)], 0, 256);
        buf.resize(256, 0);

        let dex = DexFile::read(&buf).unwrap();
        assert!(dex.string_ids.is_empty());
        assert!(dex.string_ids.meta.corrupted);
        assert!(dex.is_corrupted());
    }

    #[test]
    fn test_map_list() {
        let mut buf = build_header([(0, 0); 6], 112, 140);
        push_u4(&mut buf, 2); // map size
        push_u2(&mut buf, 0x0000); // TYPE_HEADER_ITEM
        push_u2(&mut buf, 0);
        push_u4(&mut buf, 1);
        push_u4(&mut buf, 0);
        push_u2(&mut buf, 0x0001); // TYPE_STRING_ID_ITEM
        push_u2(&mut buf, 0);
        push_u4(&mut buf, 9);
        push_u4(&mut buf, 0x70);

        let dex = DexFile::read(&buf).unwrap();
        assert!(!dex.is_corrupted());
        let map = dex.map_list.as_ref().unwrap();
        assert_eq!(map.list.len(), 2);
        assert_eq!(map.list[0].item_type, 0x0000);
        assert_eq!(map.list[1].size, 9);
        assert_eq!(map.list[1].offset, 0x70);
    }

    #[test]
    fn test_full_assembly() {
        let mut buf = build_header(
            [(4, 112), (2, 128), (1, 136), (1, 148), (1, 156), (1, 164)],
            244,
            260,
        );

        // string_ids at 112
        for off in [202u32, 208, 210, 212] {
            push_u4(&mut buf, off);
        }
        // type_ids at 128
        push_u4(&mut buf, 0);
        push_u4(&mut buf, 1);
        // proto_ids at 136
        push_u4(&mut buf, 2); // shorty_idx -> "V"
        push_u4(&mut buf, 1); // return_type_idx
        push_u4(&mut buf, 196); // parameters_off
        // field_ids at 148
        push_u2(&mut buf, 0);
        push_u2(&mut buf, 1);
        push_u4(&mut buf, 3);
        // method_ids at 156
        push_u2(&mut buf, 0);
        push_u2(&mut buf, 0);
        push_u4(&mut buf, 3);
        // class_defs at 164
        push_u4(&mut buf, 0); // class_idx
        push_u4(&mut buf, 0x1); // access_flags: public
        push_u4(&mut buf, NO_INDEX); // superclass_idx
        push_u4(&mut buf, 0); // interfaces_off
        push_u4(&mut buf, NO_INDEX); // source_file_idx
        push_u4(&mut buf, 0); // annotations_off
        push_u4(&mut buf, 216); // class_data_off
        push_u4(&mut buf, 0); // static_values_off
        // type_list at 196 (proto parameters)
        push_u4(&mut buf, 1);
        push_u2(&mut buf, 1);
        // string data at 202, 208, 210, 212
        push_uleb(&mut buf, 5);
        buf.extend_from_slice(b"LFoo;");
        push_uleb(&mut buf, 1);
        buf.extend_from_slice(b"I");
        push_uleb(&mut buf, 1);
        buf.extend_from_slice(b"V");
        push_uleb(&mut buf, 3);
        buf.extend_from_slice(b"foo");
        // class_data at 216
        push_uleb(&mut buf, 0); // static fields
        push_uleb(&mut buf, 0); // instance fields
        push_uleb(&mut buf, 1); // direct methods
        push_uleb(&mut buf, 0); // virtual methods
        push_uleb(&mut buf, 0); // method_idx diff -> method 0
        push_uleb(&mut buf, 0x1); // access_flags
        push_uleb(&mut buf, 224); // code_off
        // code item at 224
        push_u2(&mut buf, 1); // registers
        push_u2(&mut buf, 1); // ins
        push_u2(&mut buf, 0); // outs
        push_u2(&mut buf, 0); // tries
        push_u4(&mut buf, 0); // debug_info_off
        push_u4(&mut buf, 1); // insns_size
        push_u2(&mut buf, 0x000E); // return-void
        push_u2(&mut buf, 0); // pad to the map list
        // map_list at 244
        push_u4(&mut buf, 1);
        push_u2(&mut buf, 0x0000);
        push_u2(&mut buf, 0);
        push_u4(&mut buf, 1);
        push_u4(&mut buf, 0);

        assert_eq!(buf.len(), 260);

        let dex = DexFile::read(&buf).unwrap();
        assert!(!dex.is_corrupted());

        assert_eq!(dex.string_ids.len(), 4);
        assert_eq!(dex.string(0).unwrap().to_string().unwrap(), "LFoo;");
        assert_eq!(dex.string(3).unwrap().to_string().unwrap(), "foo");
        assert_eq!(dex.type_descriptor(1).unwrap().to_string().unwrap(), "I");

        let proto = &dex.proto_ids[0];
        let params = proto.parameters.as_ref().unwrap();
        assert_eq!(params.list.len(), 1);
        assert_eq!(params.list[0].type_idx, 1);

        assert_eq!(dex.field_ids[0].name_idx, 3);
        assert_eq!(dex.method_ids[0].proto_idx, 0);

        let class = &dex.class_defs[0];
        assert!(class.flags().contains(AccessFlags::PUBLIC));
        assert_eq!(class.superclass_idx, NO_INDEX);
        let class_data = class.class_data.as_ref().unwrap();
        assert_eq!(class_data.direct_methods.len(), 1);
        let method = &class_data.direct_methods[0];
        assert_eq!(method.method_idx, 0);
        let code = method.code.as_ref().unwrap();
        assert_eq!(code.registers_size, 1);
        assert_eq!(code.insns, vec![0x000E]);
        assert!(code.tries.is_empty());
        assert!(code.handlers.is_none());

        assert_eq!(dex.map_list.as_ref().unwrap().list.len(), 1);
    }

    #[test]
    fn test_fuzzed_table_offsets_never_read_out_of_bounds() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let pairs: [(u32, u32); 6] = std::array::from_fn(|_| (rng.gen(), rng.gen()));
            let mut buf = build_header(pairs, rng.gen(), 200);
            buf.resize(200, 0x41);

            // must never panic or read out of bounds, whatever the header
            // declares; a buffer this size always yields a root
            let dex = DexFile::read(&buf).unwrap();
            let _ = dex.is_corrupted();
        }
    }
}
