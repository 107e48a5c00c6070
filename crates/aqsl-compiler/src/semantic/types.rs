use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Base type of a shading-language value.
///
/// The discriminant is the low byte of the packed type bitmask and the row /
/// column of the cast priority table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum BaseType {
    Nil = 0,
    Float = 1,
    Integer = 2,
    Point = 3,
    String = 4,
    Color = 5,
    Triple = 6,
    HPoint = 7,
    Normal = 8,
    Vector = 9,
    Void = 10,
    Matrix = 11,
    SixteenTuple = 12,
    Bool = 13,
}

/// Number of base types, the dimension of the cast table.
pub const BASE_TYPE_COUNT: usize = 14;

const TYPE_IDENTIFIERS: [char; BASE_TYPE_COUNT] = [
    '@', 'f', 'i', 'p', 's', 'c', 't', 'h', 'n', 'v', 'x', 'm', 'w', 'b',
];

const TYPE_NAMES: [&str; BASE_TYPE_COUNT] = [
    "invalid",
    "float",
    "integer",
    "point",
    "string",
    "color",
    "triple",
    "hpoint",
    "normal",
    "vector",
    "void",
    "matrix",
    "sixteentuple",
    "boolean",
];

const ALL_BASE_TYPES: [BaseType; BASE_TYPE_COUNT] = [
    BaseType::Nil,
    BaseType::Float,
    BaseType::Integer,
    BaseType::Point,
    BaseType::String,
    BaseType::Color,
    BaseType::Triple,
    BaseType::HPoint,
    BaseType::Normal,
    BaseType::Vector,
    BaseType::Void,
    BaseType::Matrix,
    BaseType::SixteenTuple,
    BaseType::Bool,
];

impl BaseType {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<BaseType> {
        ALL_BASE_TYPES.get(index).copied()
    }

    /// Single-character identifier used in opcode suffixes (`addfp`, `setfc`).
    pub fn identifier(self) -> char {
        TYPE_IDENTIFIERS[self.index()]
    }

    /// Name used in Data segment declarations.
    pub fn name(self) -> &'static str {
        TYPE_NAMES[self.index()]
    }

    /// Point, normal and vector share a representation; converting among
    /// them needs no VM instruction.
    pub fn is_point_family(self) -> bool {
        matches!(self, BaseType::Point | BaseType::Normal | BaseType::Vector)
    }
}

bitflags! {
    /// Storage and usage bits carried above the base type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TypeQualifiers: u16 {
        const UNIFORM = 0x8000;
        const VARYING = 0x4000;
        const VERTEX = 0x2000;
        const OUTPUT = 0x1000;
        const PARAM = 0x0800;
        const VARIABLE = 0x0400;
        const ARRAY = 0x0200;

        const STORAGE = Self::UNIFORM.bits() | Self::VARYING.bits() | Self::VERTEX.bits();
    }
}

/// Mask selecting the base type from a packed type.
pub const BASE_TYPE_MASK: u16 = 0x00ff;

/// A full type: base type plus qualifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub base: BaseType,
    #[serde(default)]
    pub qualifiers: TypeQualifiers,
}

impl Type {
    pub const NIL: Type = Type::new(BaseType::Nil);
    pub const VOID: Type = Type::new(BaseType::Void);

    pub const fn new(base: BaseType) -> Self {
        Self {
            base,
            qualifiers: TypeQualifiers::empty(),
        }
    }

    pub fn uniform(base: BaseType) -> Self {
        Self::new(base).with(TypeQualifiers::UNIFORM)
    }

    pub fn varying(base: BaseType) -> Self {
        Self::new(base).with(TypeQualifiers::VARYING)
    }

    pub fn with(mut self, qualifiers: TypeQualifiers) -> Self {
        self.qualifiers |= qualifiers;
        self
    }

    pub fn without(mut self, qualifiers: TypeQualifiers) -> Self {
        self.qualifiers -= qualifiers;
        self
    }

    pub fn has(self, qualifiers: TypeQualifiers) -> bool {
        self.qualifiers.contains(qualifiers)
    }

    /// Vertex storage is per point, like varying.
    pub fn is_varying(self) -> bool {
        self.qualifiers
            .intersects(TypeQualifiers::VARYING | TypeQualifiers::VERTEX)
    }

    pub fn identifier(self) -> char {
        self.base.identifier()
    }

    pub fn name(self) -> &'static str {
        self.base.name()
    }

    /// Packed 16-bit encoding: base type in the low byte, qualifiers above.
    pub fn bits(self) -> u16 {
        self.base as u16 | self.qualifiers.bits()
    }

    /// Decode a packed type. Unknown base types or stray bits yield `None`.
    pub fn from_bits(bits: u16) -> Option<Type> {
        let base = BaseType::from_index((bits & BASE_TYPE_MASK) as usize)?;
        let qualifiers = TypeQualifiers::from_bits(bits & !BASE_TYPE_MASK)?;
        Some(Type { base, qualifiers })
    }
}

impl From<BaseType> for Type {
    fn from(base: BaseType) -> Self {
        Type::new(base)
    }
}

/// Single-character identifier of a type.
pub fn type_identifier(ty: Type) -> char {
    ty.identifier()
}

/// Declaration name of a type.
pub fn type_name(ty: Type) -> &'static str {
    ty.name()
}

/// Priority of implicitly converting `[from][to]`; 0 means no implicit cast.
/// Identity entries are highest so an exact match always wins a scan.
#[rustfmt::skip]
const CAST_PRIORITY: [[u8; BASE_TYPE_COUNT]; BASE_TYPE_COUNT] = [
    //         nil flt int pnt str col tri hpt nrm vec void mat 16t bool
    /* nil  */ [0,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0,   0,  0,  0],
    /* flt  */ [0, 99,  1,  2,  0,  2,  1,  1,  2,  2,  0,   1,  1,  0],
    /* int  */ [0,  2, 99,  1,  0,  1,  1,  1,  1,  1,  0,   1,  1,  0],
    /* pnt  */ [0,  0,  0, 99,  0,  0,  1,  1,  2,  2,  0,   0,  0,  0],
    /* str  */ [0,  0,  0,  0, 99,  0,  0,  0,  0,  0,  0,   0,  0,  0],
    /* col  */ [0,  0,  0,  0,  0, 99,  1,  0,  0,  0,  0,   0,  0,  0],
    /* tri  */ [0,  0,  0,  2,  0,  2, 99,  1,  2,  2,  0,   0,  0,  0],
    /* hpt  */ [0,  0,  0,  2,  0,  0,  0, 99,  0,  0,  0,   0,  0,  0],
    /* nrm  */ [0,  0,  0,  2,  0,  0,  1,  0, 99,  2,  0,   0,  0,  0],
    /* vec  */ [0,  0,  0,  2,  0,  0,  1,  0,  2, 99,  0,   0,  0,  0],
    /* void */ [0,  0,  0,  0,  0,  0,  0,  0,  0,  0, 99,   0,  0,  0],
    /* mat  */ [0,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0,  99,  1,  0],
    /* 16t  */ [0,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0,   2, 99,  0],
    /* bool */ [0,  1,  0,  0,  0,  0,  0,  0,  0,  0,  0,   0,  0, 99],
];

/// Implicit-cast priority from one base type to another.
pub fn cast_priority(from: BaseType, to: BaseType) -> u8 {
    CAST_PRIORITY[from.index()][to.index()]
}

/// Result of [`find_cast`]: the chosen candidate and its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastMatch {
    pub ty: Type,
    pub index: usize,
}

/// Pick the candidate `current` converts to best.
///
/// Qualifier bits are ignored. An exact base-type match is returned
/// immediately. Otherwise the candidate with the highest nonzero priority
/// wins; among equal priorities the earliest candidate is kept. `None` when
/// no candidate is reachable.
pub fn find_cast(current: Type, candidates: &[Type]) -> Option<CastMatch> {
    if let Some(index) = candidates.iter().position(|c| c.base == current.base) {
        return Some(CastMatch {
            ty: candidates[index],
            index,
        });
    }

    let mut best: Option<CastMatch> = None;
    let mut best_priority = 0;
    for (index, candidate) in candidates.iter().enumerate() {
        let priority = cast_priority(current.base, candidate.base);
        if priority > best_priority {
            best_priority = priority;
            best = Some(CastMatch {
                ty: *candidate,
                index,
            });
        }
    }
    best
}
