#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::descriptor::{
        BaseKind, DescriptorClass, SourceFile, WorkerDescriptor, WorkerFileName, WorkerLanguage,
    };
    use crate::precompile::{PreCompilerDirective, PreCompilerInstruction};
    use crate::protocol::ProtocolSerializer;

    const BASE_TEXT: &str =
        "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";

    /// Disjoint instructions over `BASE_TEXT`, built left to right so ranges
    /// can't intersect.
    fn arb_disjoint_instructions() -> impl Strategy<Value = Vec<PreCompilerInstruction>> {
        prop::collection::vec(
            (0u32..6, 1u32..4, 0u8..3, "[a-z]{0,4}"),
            0..8,
        )
        .prop_map(|segments| {
            let mut position = 0u32;
            let mut instructions = Vec::new();
            for (gap, len, kind, text) in segments {
                let start = position + gap;
                let end = start + len;
                if end > BASE_TEXT.len() as u32 {
                    break;
                }
                let instruction = match kind {
                    0 => PreCompilerInstruction::Insert { start, text },
                    1 => PreCompilerInstruction::Delete { start, end },
                    _ => PreCompilerInstruction::Replace { start, end, text },
                };
                position = instruction.end();
                instructions.push(instruction);
            }
            instructions
        })
    }

    fn arb_descriptor() -> impl Strategy<Value = WorkerDescriptor> {
        let classes = prop::collection::hash_set("[A-Z][a-z]{0,6}", 0..8).prop_map(|names| {
            let mut names: Vec<String> = names.into_iter().collect();
            names.sort();
            names
                .into_iter()
                .enumerate()
                .map(|(i, name)| DescriptorClass {
                    class_id: (i + 1) as u16,
                    class_name: name,
                    base_kind: match i % 3 {
                        0 => BaseKind::Entity,
                        1 => BaseKind::Service,
                        _ => BaseKind::Event,
                    },
                    file_id: 1,
                })
                .collect::<Vec<_>>()
        });

        let manifest = prop::collection::vec("[a-z]{1,8}\\.js", 1..4).prop_map(|names| {
            names
                .into_iter()
                .enumerate()
                .map(|(i, name)| WorkerFileName {
                    file_id: (i + 1) as u16,
                    name,
                })
                .collect::<Vec<_>>()
        });

        (
            1u64..u64::MAX,
            2u64..u64::MAX,
            any::<bool>(),
            "[a-z]{1,12}",
            classes,
            manifest,
        )
            .prop_map(
                |(worker_id, worker_version, has_previous, worker_name, classes, manifest)| {
                    let last_class_id = classes.len() as u16;
                    WorkerDescriptor {
                        worker_id,
                        worker_version,
                        previous_worker_version: has_previous.then(|| worker_version - 1),
                        worker_name,
                        language: WorkerLanguage::JavaScript,
                        last_class_id,
                        classes,
                        file_manifest: manifest,
                    }
                },
            )
    }

    proptest! {
        /// Applying a directive's instructions in any input order yields the
        /// same output as applying them pre-sorted, given non-overlapping
        /// instructions.
        #[test]
        fn prop_precompile_is_input_order_independent(
            instructions in arb_disjoint_instructions().prop_shuffle(),
        ) {
            let mut resorted = instructions.clone();
            resorted.sort_by_key(|i| i.start());

            let shuffled = PreCompilerDirective::new(
                SourceFile::new("base.js", BASE_TEXT),
                instructions,
            );
            let ordered = PreCompilerDirective::new(
                SourceFile::new("base.js", BASE_TEXT),
                resorted,
            );

            prop_assert_eq!(
                shuffled.pre_compile().unwrap(),
                ordered.pre_compile().unwrap()
            );
        }

        /// Length bookkeeping: the rewritten text's length equals the
        /// original plus every insertion minus every deletion.
        #[test]
        fn prop_precompile_length_accounting(
            instructions in arb_disjoint_instructions(),
        ) {
            let mut expected = BASE_TEXT.len() as i64;
            for instruction in &instructions {
                match instruction {
                    PreCompilerInstruction::Insert { text, .. } => {
                        expected += text.len() as i64;
                    }
                    PreCompilerInstruction::Delete { start, end } => {
                        expected -= (end - start) as i64;
                    }
                    PreCompilerInstruction::Replace { start, end, text } => {
                        expected += text.len() as i64 - (end - start) as i64;
                    }
                }
            }

            let directive = PreCompilerDirective::new(
                SourceFile::new("base.js", BASE_TEXT),
                instructions,
            );
            prop_assert_eq!(directive.pre_compile().unwrap().code.len() as i64, expected);
        }

        /// Encoding the same descriptor twice yields byte-identical output.
        #[test]
        fn prop_serialization_is_deterministic(descriptor in arb_descriptor()) {
            let serializer = ProtocolSerializer::default();
            let first = serializer.serialize_worker_index(&descriptor).unwrap();
            let second = serializer.serialize_worker_index(&descriptor).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Decoding a serialized worker index reproduces the descriptor
        /// exactly.
        #[test]
        fn prop_worker_index_round_trips(descriptor in arb_descriptor()) {
            let serializer = ProtocolSerializer::default();
            let bytes = serializer.serialize_worker_index(&descriptor).unwrap();
            let decoded = serializer.deserialize_worker_index(&bytes).unwrap();
            prop_assert_eq!(decoded, descriptor);
        }

        /// Setup framing carries its payload through unchanged.
        #[test]
        fn prop_setup_request_round_trips(
            descriptor in arb_descriptor(),
            code in prop::collection::vec("[ -~]{0,40}", 0..4),
        ) {
            let serializer = ProtocolSerializer::default();
            let index = serializer.serialize_worker_index(&descriptor).unwrap();
            let bytes = serializer
                .create_setup_worker_request(
                    "prop",
                    descriptor.worker_id,
                    descriptor.worker_version,
                    descriptor.previous_worker_version,
                    &index,
                    &code,
                )
                .unwrap();
            let decoded = serializer.decode_setup_worker_request(&bytes).unwrap();
            prop_assert_eq!(decoded.worker_index, index);
            prop_assert_eq!(decoded.code, code);
        }
    }
}
