//! Binary encoding of the message catalog.
//!
//! Decoding mirrors encoding field for field. The header (magic and tag) is
//! consumed by [`Message::read`], which asks the registry for an empty message
//! of that tag and then fills it via [`Message::read_payload`].

use std::io::{Read, Write};

use super::protocol::{MAGIC, Message, ObjectRef, TemplateInfo};
use crate::channel::{ChannelReader, ChannelWriter};
use crate::data::{Matrix, Vector};
use crate::error::{BridgeError, Result};
use crate::registry::TypeRegistry;

impl Message {
    /// Write header and payload. The caller flushes once the message is complete.
    pub fn write<W: Write>(&self, out: &mut ChannelWriter<W>) -> Result<()> {
        out.write_u16(MAGIC);
        out.write_byte(self.tag().code());
        self.write_payload(out)
    }

    fn write_payload<W: Write>(&self, out: &mut ChannelWriter<W>) -> Result<()> {
        match self {
            Message::Null => {}
            Message::Bool(v) => out.write_bool(*v),
            Message::Byte(v) => out.write_byte(*v),
            Message::Int32(v) => out.write_i32(*v),
            Message::Int64(v) => out.write_i64(*v),
            Message::Float64(v) => out.write_f64(*v),
            Message::String(v) | Message::Exception(v) => out.write_string(v)?,
            Message::Object(r) => {
                out.write_i32(r.id);
                match &r.classname {
                    Some(name) => {
                        out.write_bool(true);
                        out.write_string(name)?;
                    }
                    None => out.write_bool(false),
                }
            }

            Message::Vector(v) => {
                write_labels(out, v.labels())?;
                out.write_f64_array(v.values(), true)?;
            }
            Message::Matrix(m) => {
                write_labels(out, m.row_labels())?;
                write_labels(out, m.col_labels())?;
                out.write_len("matrix rows", m.rows())?;
                out.write_len("matrix columns", m.cols())?;
                out.write_f64_array(m.data(), false)?;
            }

            Message::BoolArray(v) => out.write_bool_array(v)?,
            Message::ByteArray(v) => out.write_bytes(v, true)?,
            Message::Int32Array(v) => out.write_i32_array(v)?,
            Message::Int64Array(v) => out.write_i64_array(v)?,
            Message::Float64Array(v) => out.write_f64_array(v, true)?,
            Message::StringArray(v) => out.write_string_array(v)?,
            Message::ObjectArray(items) => {
                out.write_len("object array", items.len())?;
                for item in items {
                    item.write(out)?;
                }
            }

            Message::Create { classname, args } => {
                out.write_string(classname)?;
                write_args(out, args)?;
            }
            Message::CallStaticMethod {
                classname,
                method,
                args,
            } => {
                out.write_string(classname)?;
                out.write_string(method)?;
                write_args(out, args)?;
            }
            Message::CallMethod {
                object_id,
                method,
                args,
            } => {
                out.write_i32(*object_id);
                out.write_string(method)?;
                write_args(out, args)?;
            }
            Message::GetProperty {
                object_id,
                property,
            } => {
                out.write_i32(*object_id);
                out.write_string(property)?;
            }
            Message::GetIndexedProperty {
                object_id,
                property,
                index,
            } => {
                out.write_i32(*object_id);
                out.write_string(property)?;
                out.write_i32(*index);
            }
            Message::GetIndexed { object_id, index } => {
                out.write_i32(*object_id);
                out.write_i32(*index);
            }
            Message::SetProperty {
                object_id,
                property,
                value,
            } => {
                out.write_i32(*object_id);
                out.write_string(property)?;
                value.write(out)?;
            }
            Message::GetStaticProperty {
                classname,
                property,
            } => {
                out.write_string(classname)?;
                out.write_string(property)?;
            }
            Message::SetStaticProperty {
                classname,
                property,
                value,
            } => {
                out.write_string(classname)?;
                out.write_string(property)?;
                value.write(out)?;
            }
            Message::Protect { object_id } | Message::Release { object_id } => {
                out.write_i32(*object_id);
            }
            Message::TemplateReq { classname } => out.write_string(classname)?,
            Message::TemplateReply(info) => {
                out.write_string_array(&info.properties)?;
                out.write_string_array(&info.methods)?;
                out.write_string_array(&info.static_methods)?;
            }
        }
        Ok(())
    }

    /// Read the next framed message.
    pub fn read<R: Read>(input: &mut ChannelReader<R>, registry: &TypeRegistry) -> Result<Message> {
        let magic = input.read_u16()?;
        if magic != MAGIC {
            return Err(BridgeError::BadMagic {
                found: magic,
                expected: MAGIC,
            });
        }

        let code = input.read_byte()?;
        let mut msg = registry.create_by_tag(code, None)?;
        msg.read_payload(input, registry)?;
        Ok(msg)
    }

    /// Fill this message's payload from the stream (header already consumed).
    pub fn read_payload<R: Read>(
        &mut self,
        input: &mut ChannelReader<R>,
        registry: &TypeRegistry,
    ) -> Result<()> {
        match self {
            Message::Null => {}
            Message::Bool(v) => *v = input.read_bool()?,
            Message::Byte(v) => *v = input.read_byte()?,
            Message::Int32(v) => *v = input.read_i32()?,
            Message::Int64(v) => *v = input.read_i64()?,
            Message::Float64(v) => *v = input.read_f64()?,
            Message::String(v) | Message::Exception(v) => *v = input.read_string()?,
            Message::Object(r) => {
                let id = input.read_i32()?;
                let classname = if input.read_bool()? {
                    Some(input.read_string()?)
                } else {
                    None
                };
                *r = ObjectRef::new(id, classname);
            }

            Message::Vector(v) => {
                let labels = read_labels(input)?;
                let values = input.read_f64_array(None)?;
                *v = match labels {
                    Some(labels) => Vector::with_labels(labels, values)?,
                    None => Vector::new(values),
                };
            }
            Message::Matrix(m) => {
                let row_labels = read_labels(input)?;
                let col_labels = read_labels(input)?;
                let rows = read_dim(input, "rows")?;
                let cols = read_dim(input, "columns")?;
                let count = rows.checked_mul(cols).ok_or_else(|| {
                    BridgeError::malformed(format!("matrix {rows}x{cols} overflows"))
                })?;
                let data = input.read_f64_array(Some(count))?;

                let mut matrix = Matrix::new(rows, cols, data)?;
                if let Some(labels) = row_labels {
                    matrix = matrix.with_row_labels(labels)?;
                }
                if let Some(labels) = col_labels {
                    matrix = matrix.with_col_labels(labels)?;
                }
                *m = matrix;
            }

            Message::BoolArray(v) => *v = input.read_bool_array(None)?,
            Message::ByteArray(v) => *v = input.read_bytes(None)?,
            Message::Int32Array(v) => *v = input.read_i32_array(None)?,
            Message::Int64Array(v) => *v = input.read_i64_array(None)?,
            Message::Float64Array(v) => *v = input.read_f64_array(None)?,
            Message::StringArray(v) => *v = input.read_string_array(None)?,
            Message::ObjectArray(items) => {
                let len = read_dim(input, "object array")?;
                *items = (0..len)
                    .map(|_| Message::read(input, registry))
                    .collect::<Result<_>>()?;
            }

            Message::Create { classname, args } => {
                *classname = input.read_string()?;
                *args = read_args(input, registry)?;
            }
            Message::CallStaticMethod {
                classname,
                method,
                args,
            } => {
                *classname = input.read_string()?;
                *method = input.read_string()?;
                *args = read_args(input, registry)?;
            }
            Message::CallMethod {
                object_id,
                method,
                args,
            } => {
                *object_id = input.read_i32()?;
                *method = input.read_string()?;
                *args = read_args(input, registry)?;
            }
            Message::GetProperty {
                object_id,
                property,
            } => {
                *object_id = input.read_i32()?;
                *property = input.read_string()?;
            }
            Message::GetIndexedProperty {
                object_id,
                property,
                index,
            } => {
                *object_id = input.read_i32()?;
                *property = input.read_string()?;
                *index = input.read_i32()?;
            }
            Message::GetIndexed { object_id, index } => {
                *object_id = input.read_i32()?;
                *index = input.read_i32()?;
            }
            Message::SetProperty {
                object_id,
                property,
                value,
            } => {
                *object_id = input.read_i32()?;
                *property = input.read_string()?;
                *value = Box::new(Message::read(input, registry)?);
            }
            Message::GetStaticProperty {
                classname,
                property,
            } => {
                *classname = input.read_string()?;
                *property = input.read_string()?;
            }
            Message::SetStaticProperty {
                classname,
                property,
                value,
            } => {
                *classname = input.read_string()?;
                *property = input.read_string()?;
                *value = Box::new(Message::read(input, registry)?);
            }
            Message::Protect { object_id } | Message::Release { object_id } => {
                *object_id = input.read_i32()?;
            }
            Message::TemplateReq { classname } => *classname = input.read_string()?,
            Message::TemplateReply(info) => {
                *info = TemplateInfo {
                    properties: input.read_string_array(None)?,
                    methods: input.read_string_array(None)?,
                    static_methods: input.read_string_array(None)?,
                };
            }
        }
        Ok(())
    }
}

fn write_labels<W: Write>(out: &mut ChannelWriter<W>, labels: Option<&[String]>) -> Result<()> {
    match labels {
        Some(labels) => {
            out.write_len("label block", labels.len())?;
            for label in labels {
                out.write_string(label)?;
            }
        }
        None => out.write_i32(0),
    }
    Ok(())
}

fn read_labels<R: Read>(input: &mut ChannelReader<R>) -> Result<Option<Vec<String>>> {
    let len = read_dim(input, "label block")?;
    if len == 0 {
        return Ok(None);
    }
    input.read_string_array(Some(len)).map(Some)
}

fn read_dim<R: Read>(input: &mut ChannelReader<R>, what: &str) -> Result<usize> {
    let n = input.read_i32()?;
    usize::try_from(n).map_err(|_| BridgeError::malformed(format!("negative {what} count {n}")))
}

fn write_args<W: Write>(out: &mut ChannelWriter<W>, args: &[Message]) -> Result<()> {
    let argc = u16::try_from(args.len()).map_err(|_| BridgeError::TooLong {
        what: "argument list",
        len: args.len(),
    })?;
    out.write_u16(argc);
    for arg in args {
        arg.write(out)?;
    }
    Ok(())
}

fn read_args<R: Read>(input: &mut ChannelReader<R>, registry: &TypeRegistry) -> Result<Vec<Message>> {
    let argc = input.read_u16()?;
    (0..argc).map(|_| Message::read(input, registry)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(msg: &Message) -> Vec<u8> {
        let mut out = ChannelWriter::new(Vec::new());
        msg.write(&mut out).unwrap();
        out.flush().unwrap();
        out.into_inner()
    }

    fn decode(bytes: &[u8]) -> Result<Message> {
        let registry = TypeRegistry::standard();
        let mut input = ChannelReader::new(bytes);
        Message::read(&mut input, &registry)
    }

    fn roundtrip(msg: Message) {
        let bytes = encode(&msg);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn scalars_roundtrip() {
        roundtrip(Message::Null);
        roundtrip(Message::Bool(true));
        roundtrip(Message::Byte(0xfe));
        roundtrip(Message::Float64(-0.125));
        roundtrip(Message::String("Ünïcode ✓".into()));
        roundtrip(Message::Exception("NullReferenceException".into()));
    }

    #[test]
    fn int_widening_boundaries_roundtrip() {
        let two_31 = 1i64 << 31;
        for v in [two_31 - 1, two_31, two_31 + 1, -two_31, -two_31 - 1] {
            let msg = Message::int(v);
            let decoded = decode(&encode(&msg)).unwrap();
            let back = match decoded {
                Message::Int32(x) => i64::from(x),
                Message::Int64(x) => x,
                other => panic!("unexpected {other:?}"),
            };
            assert_eq!(back, v);
        }
    }

    #[test]
    fn object_ref_with_and_without_class() {
        roundtrip(Message::Object(ObjectRef::new(7, Some("Point".into()))));
        roundtrip(Message::Object(ObjectRef::new(12, None)));
    }

    #[test]
    fn object_ref_layout() {
        let bytes = encode(&Message::Object(ObjectRef::new(7, None)));
        insta::assert_snapshot!(hex(&bytes), @"0dd0090700000000");
    }

    #[test]
    fn arrays_roundtrip() {
        roundtrip(Message::BoolArray(vec![true, false, true]));
        roundtrip(Message::ByteArray(vec![1, 2, 3]));
        roundtrip(Message::Int32Array(vec![1, -3, 5, 7]));
        roundtrip(Message::Int64Array(vec![1 << 40, -1]));
        roundtrip(Message::Float64Array(vec![]));
        roundtrip(Message::StringArray(vec!["this".into(), "that".into()]));
        roundtrip(Message::ObjectArray(vec![
            Message::Int32(1),
            Message::String("two".into()),
            Message::Object(ObjectRef::new(3, Some("Thing".into()))),
        ]));
    }

    #[test]
    fn vector_with_labels_roundtrip() {
        let v = Vector::with_labels(vec!["a".into(), "b".into()], vec![3.14, 1.34]).unwrap();
        roundtrip(Message::Vector(v));
        roundtrip(Message::Vector(Vector::new(vec![1.0, 2.0, 3.0])));
    }

    #[test]
    fn matrix_preserves_column_major_and_labels() {
        let m = Matrix::from_rows(&[vec![2.0, 0.5, 0.0], vec![0.0, 3.0, 7.0]])
            .unwrap()
            .with_row_labels(vec!["r1".into(), "r2".into()])
            .unwrap()
            .with_col_labels(vec!["a".into(), "b".into(), "c".into()])
            .unwrap();

        let decoded = decode(&encode(&Message::Matrix(m.clone()))).unwrap();
        let Message::Matrix(back) = decoded else {
            panic!("expected matrix");
        };
        assert_eq!(back, m);
        assert_eq!(back.data(), &[2.0, 0.0, 0.5, 3.0, 0.0, 7.0]);
        assert_eq!(back.get(1, 2), Some(7.0));
    }

    #[test]
    fn labelless_matrix_decodes_without_labels() {
        let m = Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let Message::Matrix(back) = decode(&encode(&Message::Matrix(m))).unwrap() else {
            panic!("expected matrix");
        };
        assert!(back.row_labels().is_none());
        assert!(back.col_labels().is_none());
    }

    #[test]
    fn matrix_layout() {
        let m = Matrix::new(1, 2, vec![1.0, 2.0]).unwrap();
        let bytes = encode(&Message::Matrix(m));
        insta::assert_snapshot!(
            hex(&bytes),
            @"0dd01600000000000000000100000002000000000000000000f03f0000000000000040"
        );
    }

    #[test]
    fn control_messages_roundtrip() {
        roundtrip(Message::Create {
            classname: "Point".into(),
            args: vec![Message::Int32(3), Message::Int32(4)],
        });
        roundtrip(Message::CallStaticMethod {
            classname: "System.Math".into(),
            method: "Sqrt".into(),
            args: vec![Message::Float64(2.0)],
        });
        roundtrip(Message::CallMethod {
            object_id: 7,
            method: "Magnitude".into(),
            args: vec![],
        });
        roundtrip(Message::GetProperty {
            object_id: 7,
            property: "X".into(),
        });
        roundtrip(Message::GetIndexedProperty {
            object_id: 7,
            property: "Item".into(),
            index: 2,
        });
        roundtrip(Message::GetIndexed {
            object_id: 7,
            index: 0,
        });
        roundtrip(Message::SetProperty {
            object_id: 7,
            property: "X".into(),
            value: Box::new(Message::Float64(1.5)),
        });
        roundtrip(Message::GetStaticProperty {
            classname: "DateTime".into(),
            property: "Now".into(),
        });
        roundtrip(Message::SetStaticProperty {
            classname: "Config".into(),
            property: "Level".into(),
            value: Box::new(Message::String("debug".into())),
        });
        roundtrip(Message::Protect { object_id: 7 });
        roundtrip(Message::Release { object_id: 7 });
        roundtrip(Message::TemplateReq {
            classname: "Point".into(),
        });
        roundtrip(Message::TemplateReply(TemplateInfo {
            properties: vec!["X".into(), "Y".into()],
            methods: vec!["Magnitude".into()],
            static_methods: vec![],
        }));
    }

    #[test]
    fn call_method_layout() {
        let bytes = encode(&Message::CallMethod {
            object_id: 7,
            method: "Magnitude".into(),
            args: vec![],
        });
        insta::assert_snapshot!(hex(&bytes), @"0dd0cb07000000090000004d61676e69747564650000");
    }

    #[test]
    fn release_layout() {
        let bytes = encode(&Message::Release { object_id: 7 });
        insta::assert_snapshot!(hex(&bytes), @"0dd0d307000000");
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = encode(&Message::Null);
        bytes[0] = 0xef;
        assert!(matches!(
            decode(&bytes),
            Err(BridgeError::BadMagic { found: 0xd0ef, .. })
        ));
    }

    #[test]
    fn unknown_tag_rejected() {
        let bytes = [0x0d, 0xd0, 0x03];
        assert!(matches!(decode(&bytes), Err(BridgeError::UnknownTag(3))));
    }

    #[test]
    fn truncated_payload_is_end_of_stream() {
        let bytes = encode(&Message::String("truncated".into()));
        assert!(matches!(
            decode(&bytes[..bytes.len() - 2]),
            Err(BridgeError::EndOfStream { .. })
        ));
    }

    #[test]
    fn too_many_arguments_rejected_before_flush() {
        let msg = Message::Create {
            classname: "Huge".into(),
            args: vec![Message::Null; usize::from(u16::MAX) + 1],
        };
        let mut out = ChannelWriter::new(Vec::new());
        assert!(matches!(
            msg.write(&mut out),
            Err(BridgeError::TooLong {
                what: "argument list",
                ..
            })
        ));
        assert!(out.get_ref().is_empty());
    }

    #[test]
    fn back_to_back_messages() {
        let mut out = ChannelWriter::new(Vec::new());
        Message::Int32(1).write(&mut out).unwrap();
        Message::String("two".into()).write(&mut out).unwrap();
        out.flush().unwrap();
        let bytes = out.into_inner();

        let registry = TypeRegistry::standard();
        let mut input = ChannelReader::new(bytes.as_slice());
        assert_eq!(Message::read(&mut input, &registry).unwrap(), Message::Int32(1));
        assert_eq!(
            Message::read(&mut input, &registry).unwrap(),
            Message::String("two".into())
        );
        assert!(input.is_eof());
    }
}
