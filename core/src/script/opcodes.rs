//! The opcode catalogue (spec §4.1): constants, flow control, stack
//! manipulation, bit logic, arithmetic, crypto and locktime opcodes.
//! Values match the conventional Script byte assignments so that scripts
//! produced by other implementations decode identically here.

#![allow(non_camel_case_types)]

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
	// push-value opcodes: 0x01..=0x4b push that many literal bytes.
	PushBytes(u8),
	OP_0,
	OP_PUSHDATA1,
	OP_PUSHDATA2,
	OP_PUSHDATA4,
	OP_1NEGATE,
	OP_RESERVED,
	OP_N(u8), // OP_1 (0x51) ..= OP_16 (0x60)

	// flow control
	OP_NOP,
	OP_IF,
	OP_NOTIF,
	OP_ELSE,
	OP_ENDIF,
	OP_VERIFY,
	OP_RETURN,

	// stack manipulation
	OP_TOALTSTACK,
	OP_FROMALTSTACK,
	OP_IFDUP,
	OP_DEPTH,
	OP_DROP,
	OP_DUP,
	OP_NIP,
	OP_OVER,
	OP_PICK,
	OP_ROLL,
	OP_ROT,
	OP_SWAP,
	OP_TUCK,
	OP_2DROP,
	OP_2DUP,
	OP_3DUP,
	OP_2OVER,
	OP_2ROT,
	OP_2SWAP,

	// bit logic
	OP_EQUAL,
	OP_EQUALVERIFY,

	// arithmetic on 4-byte signed integers
	OP_1ADD,
	OP_1SUB,
	OP_NEGATE,
	OP_ABS,
	OP_NOT,
	OP_0NOTEQUAL,
	OP_ADD,
	OP_SUB,
	OP_BOOLAND,
	OP_BOOLOR,
	OP_NUMEQUAL,
	OP_NUMEQUALVERIFY,
	OP_NUMNOTEQUAL,
	OP_LESSTHAN,
	OP_GREATERTHAN,
	OP_LESSTHANOREQUAL,
	OP_GREATERTHANOREQUAL,
	OP_MIN,
	OP_MAX,
	OP_WITHIN,

	// crypto
	OP_RIPEMD160,
	OP_SHA1,
	OP_SHA256,
	OP_HASH160,
	OP_HASH256,
	OP_CODESEPARATOR,
	OP_CHECKSIG,
	OP_CHECKSIGVERIFY,
	OP_CHECKMULTISIG,
	OP_CHECKMULTISIGVERIFY,

	// locktime
	OP_CHECKLOCKTIMEVERIFY,

	// explicitly disabled in this design (never executed successfully)
	OP_DISABLED,

	/// Extension point for alt-chain opcodes (name operations, auxiliary
	/// PoW) handed to the `EvalHook` before falling back to this table.
	OP_UNKNOWN(u8),
}

impl Opcode {
	pub fn from_byte(b: u8) -> Opcode {
		use Opcode::*;
		match b {
			0x00 => OP_0,
			0x01..=0x4b => PushBytes(b),
			0x4c => OP_PUSHDATA1,
			0x4d => OP_PUSHDATA2,
			0x4e => OP_PUSHDATA4,
			0x4f => OP_1NEGATE,
			0x50 => OP_RESERVED,
			0x51..=0x60 => OP_N(b - 0x50),
			0x61 => OP_NOP,
			0x63 => OP_IF,
			0x64 => OP_NOTIF,
			0x67 => OP_ELSE,
			0x68 => OP_ENDIF,
			0x69 => OP_VERIFY,
			0x6a => OP_RETURN,
			0x6b => OP_TOALTSTACK,
			0x6c => OP_FROMALTSTACK,
			0x6d => OP_2DROP,
			0x6e => OP_2DUP,
			0x6f => OP_3DUP,
			0x70 => OP_2OVER,
			0x71 => OP_2ROT,
			0x72 => OP_2SWAP,
			0x73 => OP_IFDUP,
			0x74 => OP_DEPTH,
			0x75 => OP_DROP,
			0x76 => OP_DUP,
			0x77 => OP_NIP,
			0x78 => OP_OVER,
			0x79 => OP_PICK,
			0x7a => OP_ROLL,
			0x7b => OP_ROT,
			0x7c => OP_SWAP,
			0x7d => OP_TUCK,
			0x87 => OP_EQUAL,
			0x88 => OP_EQUALVERIFY,
			0x8b => OP_1ADD,
			0x8c => OP_1SUB,
			0x8f => OP_NEGATE,
			0x90 => OP_ABS,
			0x91 => OP_NOT,
			0x92 => OP_0NOTEQUAL,
			0x93 => OP_ADD,
			0x94 => OP_SUB,
			0x9a => OP_BOOLAND,
			0x9b => OP_BOOLOR,
			0x9c => OP_NUMEQUAL,
			0x9d => OP_NUMEQUALVERIFY,
			0x9e => OP_NUMNOTEQUAL,
			0x9f => OP_LESSTHAN,
			0xa0 => OP_GREATERTHAN,
			0xa1 => OP_LESSTHANOREQUAL,
			0xa2 => OP_GREATERTHANOREQUAL,
			0xa3 => OP_MIN,
			0xa4 => OP_MAX,
			0xa5 => OP_WITHIN,
			0xa6 => OP_RIPEMD160,
			0xa7 => OP_SHA1,
			0xa8 => OP_SHA256,
			0xa9 => OP_HASH160,
			0xaa => OP_HASH256,
			0xab => OP_CODESEPARATOR,
			0xac => OP_CHECKSIG,
			0xad => OP_CHECKSIGVERIFY,
			0xae => OP_CHECKMULTISIG,
			0xaf => OP_CHECKMULTISIGVERIFY,
			0xb1 => OP_CHECKLOCKTIMEVERIFY,
			// 0x7e..=0x86, 0x8d, 0x8e, 0x95..=0x99 were disabled by
			// upstream consensus rules (string/splice/multiply ops); we
			// carry the same restriction rather than re-enable them.
			0x7e..=0x86 | 0x8d | 0x8e | 0x95..=0x99 => OP_DISABLED,
			other => OP_UNKNOWN(other),
		}
	}
}
