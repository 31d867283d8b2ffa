//! Token registry: keyword <-> code tables for the rule language.
//!
//! Four independent namespaces exist: commands, condition keys, source
//! types and compare types. All lookups are exact and case-sensitive. The
//! tables are plain `match` expressions, so there is nothing to initialise
//! and nothing that can change after startup.

/// Offset added to a compare code to form its case-insensitive twin.
pub const IGNORE_CASE_OFFSET: u8 = 50;

/// Directive keyword at the start of a rule line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Set,
    Clear,
    Chipset,
    Condition,
    If,
    ElseIf,
    Else,
    EndIf,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Set,
        Command::Clear,
        Command::Chipset,
        Command::Condition,
        Command::If,
        Command::ElseIf,
        Command::Else,
        Command::EndIf,
    ];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "set" => Some(Command::Set),
            "clear" => Some(Command::Clear),
            "chipset" => Some(Command::Chipset),
            "condition" => Some(Command::Condition),
            "if" => Some(Command::If),
            "elseif" => Some(Command::ElseIf),
            "else" => Some(Command::Else),
            "endif" => Some(Command::EndIf),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Command::Set => "set",
            Command::Clear => "clear",
            Command::Chipset => "chipset",
            Command::Condition => "condition",
            Command::If => "if",
            Command::ElseIf => "elseif",
            Command::Else => "else",
            Command::EndIf => "endif",
        }
    }
}

/// Key inside a `(SourceType=..,CompareType=..,MatchString=..)` group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKey {
    SourceType,
    CompareType,
    MatchString,
}

impl ConditionKey {
    /// Mask with every key present.
    pub const ALL_MASK: u8 = 0b111;

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "SourceType" => Some(ConditionKey::SourceType),
            "CompareType" => Some(ConditionKey::CompareType),
            "MatchString" => Some(ConditionKey::MatchString),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ConditionKey::SourceType => "SourceType",
            ConditionKey::CompareType => "CompareType",
            ConditionKey::MatchString => "MatchString",
        }
    }

    /// Bit recorded in the "found" mask while parsing a condition.
    pub fn mask(self) -> u8 {
        match self {
            ConditionKey::SourceType => 1,
            ConditionKey::CompareType => 2,
            ConditionKey::MatchString => 4,
        }
    }

    /// First key absent from `found`, in declaration order.
    pub fn first_missing(found: u8) -> Option<Self> {
        [
            ConditionKey::SourceType,
            ConditionKey::CompareType,
            ConditionKey::MatchString,
        ]
        .into_iter()
        .find(|key| found & key.mask() == 0)
    }
}

/// Where the left-hand side of a comparison comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceType {
    PreviousRegexMatch,
    CommandLine,
    DeviceMake,
    DeviceModel,
    DeviceBuildNumber,
    AndroidVersion,
    Hardware,
    Chipset,
    GpuFamily,
    GlVersion,
    VulkanVersion,
    VulkanAvailable,
    TotalPhysicalGb,
    SecurityPatchDate,
    /// `[EXIST]`: tests whether the variable named by the match string is set.
    Exist,
    /// Any unrecognised source: the source string itself is the value.
    Literal,
}

impl SourceType {
    /// Sources backed by a device property.
    pub const DEVICE: [SourceType; 13] = [
        SourceType::CommandLine,
        SourceType::DeviceMake,
        SourceType::DeviceModel,
        SourceType::DeviceBuildNumber,
        SourceType::AndroidVersion,
        SourceType::Hardware,
        SourceType::Chipset,
        SourceType::GpuFamily,
        SourceType::GlVersion,
        SourceType::VulkanVersion,
        SourceType::VulkanAvailable,
        SourceType::TotalPhysicalGb,
        SourceType::SecurityPatchDate,
    ];

    pub const EXIST_KEYWORD: &'static str = "[EXIST]";

    /// Never fails: unknown text is a literal value.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "SRC_PreviousRegexMatch" => SourceType::PreviousRegexMatch,
            "SRC_CommandLine" => SourceType::CommandLine,
            "SRC_DeviceMake" => SourceType::DeviceMake,
            "SRC_DeviceModel" => SourceType::DeviceModel,
            "SRC_DeviceBuildNumber" => SourceType::DeviceBuildNumber,
            "SRC_AndroidVersion" => SourceType::AndroidVersion,
            "SRC_Hardware" => SourceType::Hardware,
            "SRC_Chipset" => SourceType::Chipset,
            "SRC_GPUFamily" => SourceType::GpuFamily,
            "SRC_GLVersion" => SourceType::GlVersion,
            "SRC_VulkanVersion" => SourceType::VulkanVersion,
            "SRC_VulkanAvailable" => SourceType::VulkanAvailable,
            "SRC_TotalPhysicalGB" => SourceType::TotalPhysicalGb,
            "SRC_SecurityPatchDate" => SourceType::SecurityPatchDate,
            Self::EXIST_KEYWORD => SourceType::Exist,
            _ => SourceType::Literal,
        }
    }

    /// Keyword text; `None` for literal sources, which have no keyword.
    pub fn keyword(self) -> Option<&'static str> {
        let keyword = match self {
            SourceType::PreviousRegexMatch => "SRC_PreviousRegexMatch",
            SourceType::CommandLine => "SRC_CommandLine",
            SourceType::DeviceMake => "SRC_DeviceMake",
            SourceType::DeviceModel => "SRC_DeviceModel",
            SourceType::DeviceBuildNumber => "SRC_DeviceBuildNumber",
            SourceType::AndroidVersion => "SRC_AndroidVersion",
            SourceType::Hardware => "SRC_Hardware",
            SourceType::Chipset => "SRC_Chipset",
            SourceType::GpuFamily => "SRC_GPUFamily",
            SourceType::GlVersion => "SRC_GLVersion",
            SourceType::VulkanVersion => "SRC_VulkanVersion",
            SourceType::VulkanAvailable => "SRC_VulkanAvailable",
            SourceType::TotalPhysicalGb => "SRC_TotalPhysicalGB",
            SourceType::SecurityPatchDate => "SRC_SecurityPatchDate",
            SourceType::Exist => Self::EXIST_KEYWORD,
            SourceType::Literal => return None,
        };
        Some(keyword)
    }

    pub fn code(self) -> u8 {
        match self {
            SourceType::PreviousRegexMatch => 0,
            SourceType::CommandLine => 1,
            SourceType::DeviceMake => 2,
            SourceType::DeviceModel => 3,
            SourceType::DeviceBuildNumber => 4,
            SourceType::AndroidVersion => 5,
            SourceType::Hardware => 6,
            SourceType::Chipset => 7,
            SourceType::GpuFamily => 8,
            SourceType::GlVersion => 9,
            SourceType::VulkanVersion => 10,
            SourceType::VulkanAvailable => 11,
            SourceType::TotalPhysicalGb => 12,
            SourceType::SecurityPatchDate => 13,
            SourceType::Exist => 0xFE,
            SourceType::Literal => 0xFF,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SourceType::PreviousRegexMatch),
            0xFE => Some(SourceType::Exist),
            0xFF => Some(SourceType::Literal),
            _ => Self::DEVICE.into_iter().find(|source| source.code() == code),
        }
    }
}

/// Comparison operator, without its case-sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Regex,
    StartsWith,
    EndsWith,
    Contains,
    VersionLess,
    VersionLessEqual,
    VersionGreater,
    VersionGreaterEqual,
}

impl CompareOp {
    pub const ALL: [CompareOp; 14] = [
        CompareOp::Equal,
        CompareOp::NotEqual,
        CompareOp::Less,
        CompareOp::LessEqual,
        CompareOp::Greater,
        CompareOp::GreaterEqual,
        CompareOp::Regex,
        CompareOp::StartsWith,
        CompareOp::EndsWith,
        CompareOp::Contains,
        CompareOp::VersionLess,
        CompareOp::VersionLessEqual,
        CompareOp::VersionGreater,
        CompareOp::VersionGreaterEqual,
    ];

    pub fn code(self) -> u8 {
        match self {
            CompareOp::Equal => 0,
            CompareOp::NotEqual => 1,
            CompareOp::Less => 2,
            CompareOp::LessEqual => 3,
            CompareOp::Greater => 4,
            CompareOp::GreaterEqual => 5,
            CompareOp::Regex => 6,
            CompareOp::StartsWith => 7,
            CompareOp::EndsWith => 8,
            CompareOp::Contains => 9,
            CompareOp::VersionLess => 10,
            CompareOp::VersionLessEqual => 11,
            CompareOp::VersionGreater => 12,
            CompareOp::VersionGreaterEqual => 13,
        }
    }

    /// Whether a case-insensitive `...Ignore` form exists.
    pub fn has_ignore_form(self) -> bool {
        matches!(
            self,
            CompareOp::Equal
                | CompareOp::NotEqual
                | CompareOp::Regex
                | CompareOp::StartsWith
                | CompareOp::EndsWith
                | CompareOp::Contains
        )
    }
}

/// A compare operator plus its case-sensitivity, as stored in bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompareType {
    pub op: CompareOp,
    pub ignore_case: bool,
}

impl CompareType {
    pub const fn sensitive(op: CompareOp) -> Self {
        Self {
            op,
            ignore_case: false,
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let (op, ignore_case) = match keyword {
            "CMP_Equal" => (CompareOp::Equal, false),
            "CMP_NotEqual" => (CompareOp::NotEqual, false),
            "CMP_Less" => (CompareOp::Less, false),
            "CMP_LessEqual" => (CompareOp::LessEqual, false),
            "CMP_Greater" => (CompareOp::Greater, false),
            "CMP_GreaterEqual" => (CompareOp::GreaterEqual, false),
            "CMP_Regex" => (CompareOp::Regex, false),
            "CMP_StartsWith" => (CompareOp::StartsWith, false),
            "CMP_EndsWith" => (CompareOp::EndsWith, false),
            "CMP_Contains" => (CompareOp::Contains, false),
            "CMP_VersionLess" => (CompareOp::VersionLess, false),
            "CMP_VersionLessEqual" => (CompareOp::VersionLessEqual, false),
            "CMP_VersionGreater" => (CompareOp::VersionGreater, false),
            "CMP_VersionGreaterEqual" => (CompareOp::VersionGreaterEqual, false),
            "CMP_EqualIgnore" => (CompareOp::Equal, true),
            "CMP_NotEqualIgnore" => (CompareOp::NotEqual, true),
            "CMP_RegexIgnore" => (CompareOp::Regex, true),
            "CMP_StartsWithIgnore" => (CompareOp::StartsWith, true),
            "CMP_EndsWithIgnore" => (CompareOp::EndsWith, true),
            "CMP_ContainsIgnore" => (CompareOp::Contains, true),
            _ => return None,
        };
        Some(Self { op, ignore_case })
    }

    pub fn keyword(self) -> &'static str {
        match (self.op, self.ignore_case) {
            (CompareOp::Equal, false) => "CMP_Equal",
            (CompareOp::NotEqual, false) => "CMP_NotEqual",
            (CompareOp::Less, _) => "CMP_Less",
            (CompareOp::LessEqual, _) => "CMP_LessEqual",
            (CompareOp::Greater, _) => "CMP_Greater",
            (CompareOp::GreaterEqual, _) => "CMP_GreaterEqual",
            (CompareOp::Regex, false) => "CMP_Regex",
            (CompareOp::StartsWith, false) => "CMP_StartsWith",
            (CompareOp::EndsWith, false) => "CMP_EndsWith",
            (CompareOp::Contains, false) => "CMP_Contains",
            (CompareOp::VersionLess, _) => "CMP_VersionLess",
            (CompareOp::VersionLessEqual, _) => "CMP_VersionLessEqual",
            (CompareOp::VersionGreater, _) => "CMP_VersionGreater",
            (CompareOp::VersionGreaterEqual, _) => "CMP_VersionGreaterEqual",
            (CompareOp::Equal, true) => "CMP_EqualIgnore",
            (CompareOp::NotEqual, true) => "CMP_NotEqualIgnore",
            (CompareOp::Regex, true) => "CMP_RegexIgnore",
            (CompareOp::StartsWith, true) => "CMP_StartsWithIgnore",
            (CompareOp::EndsWith, true) => "CMP_EndsWithIgnore",
            (CompareOp::Contains, true) => "CMP_ContainsIgnore",
        }
    }

    pub fn code(self) -> u8 {
        if self.ignore_case {
            self.op.code() + IGNORE_CASE_OFFSET
        } else {
            self.op.code()
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let (base, ignore_case) = match code.checked_sub(IGNORE_CASE_OFFSET) {
            Some(base) => (base, true),
            None => (code, false),
        };
        let op = CompareOp::ALL.into_iter().find(|op| op.code() == base)?;
        if ignore_case && !op.has_ignore_form() {
            return None;
        }
        Some(Self { op, ignore_case })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_keywords_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::from_keyword(command.keyword()), Some(command));
        }
        assert_eq!(Command::from_keyword("SET"), None);
        assert_eq!(Command::from_keyword("sets"), None);
    }

    #[test]
    fn test_condition_key_mask() {
        let found = ConditionKey::SourceType.mask() | ConditionKey::MatchString.mask();
        assert_eq!(
            ConditionKey::first_missing(found),
            Some(ConditionKey::CompareType)
        );
        assert_eq!(ConditionKey::first_missing(ConditionKey::ALL_MASK), None);
    }

    #[test]
    fn test_source_type_literal_fallback() {
        assert_eq!(
            SourceType::from_keyword("SRC_DeviceMake"),
            SourceType::DeviceMake
        );
        assert_eq!(SourceType::from_keyword("[EXIST]"), SourceType::Exist);
        assert_eq!(SourceType::from_keyword("src_devicemake"), SourceType::Literal);
        assert_eq!(SourceType::from_keyword("$(GPU)"), SourceType::Literal);
        assert_eq!(SourceType::Literal.keyword(), None);
    }

    #[test]
    fn test_source_codes_round_trip() {
        for source in SourceType::DEVICE {
            assert_eq!(SourceType::from_code(source.code()), Some(source));
            let keyword = source.keyword().unwrap();
            assert_eq!(SourceType::from_keyword(keyword), source);
        }
        assert_eq!(SourceType::from_code(0), Some(SourceType::PreviousRegexMatch));
        assert_eq!(SourceType::from_code(0xFE), Some(SourceType::Exist));
        assert_eq!(SourceType::from_code(0xFF), Some(SourceType::Literal));
        assert_eq!(SourceType::from_code(99), None);
    }

    #[test]
    fn test_compare_codes() {
        assert_eq!(CompareType::from_keyword("CMP_Equal").unwrap().code(), 0);
        assert_eq!(
            CompareType::from_keyword("CMP_VersionGreaterEqual")
                .unwrap()
                .code(),
            13
        );
        let ignore = CompareType::from_keyword("CMP_EqualIgnore").unwrap();
        assert_eq!(ignore.code(), CompareOp::Equal.code() + IGNORE_CASE_OFFSET);
        assert_eq!(CompareType::from_code(50), Some(ignore));
        assert_eq!(CompareType::from_keyword("CMP_LessIgnore"), None);
        assert_eq!(CompareType::from_keyword("cmp_equal"), None);
    }

    #[test]
    fn test_compare_keywords_round_trip() {
        for op in CompareOp::ALL {
            let sensitive = CompareType::sensitive(op);
            assert_eq!(CompareType::from_keyword(sensitive.keyword()), Some(sensitive));
            assert_eq!(CompareType::from_code(sensitive.code()), Some(sensitive));
            if op.has_ignore_form() {
                let ignore = CompareType {
                    op,
                    ignore_case: true,
                };
                assert_eq!(CompareType::from_keyword(ignore.keyword()), Some(ignore));
                assert_eq!(CompareType::from_code(ignore.code()), Some(ignore));
            } else {
                assert_eq!(CompareType::from_code(op.code() + IGNORE_CASE_OFFSET), None);
            }
        }
        assert_eq!(CompareType::from_code(14), None);
        assert_eq!(CompareType::from_code(200), None);
    }
}
