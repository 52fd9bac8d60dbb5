//! Controlled vocabulary parameters and the accession table that gives them meaning.
//!
//! mzML carries nearly all of its semantics in `<cvParam>` elements identified by an
//! accession like `MS:1000511`. [`CvRole`] is the closed set of accessions this crate
//! interprets, and [`Param`] is the owned form of a single parsed parameter.
use std::borrow::Cow;
use std::fmt::Display;
use std::str::{self, FromStr};

/// Split a CURIE like `MS:1000511` into its vocabulary and numeric accession.
pub fn curie_to_num(curie: &str) -> (Option<ControlledVocabulary>, Option<u32>) {
    let mut parts = curie.splitn(2, ':');
    let prefix = parts
        .next()
        .and_then(|v| v.parse::<ControlledVocabulary>().ok())
        .and_then(|cv| cv.as_option());
    match parts.next().map(|k| k.parse::<u32>()) {
        Some(Ok(v)) => (prefix, Some(v)),
        _ => (prefix, None),
    }
}

pub trait ParamLike {
    fn name(&self) -> &str;
    fn value(&self) -> &str;
    fn accession(&self) -> Option<u32>;
    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary>;
    fn unit(&self) -> Unit;

    fn coerce<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value().parse::<T>()
    }

    fn is_controlled(&self) -> bool {
        self.accession().is_some()
    }

    fn curie(&self) -> Option<String> {
        match (self.controlled_vocabulary(), self.accession()) {
            (Some(cv), Some(acc)) => Some(format!("{}:{:07}", cv.prefix(), acc)),
            _ => None,
        }
    }

    /// The semantic role of this parameter, if its accession is one this crate knows
    fn role(&self) -> Option<CvRole> {
        match (self.controlled_vocabulary(), self.accession()) {
            (Some(cv), Some(acc)) => CvRole::from_accession_num(cv, acc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl Param {
    pub fn new() -> Param {
        Param {
            ..Default::default()
        }
    }

    pub fn new_key_value(name: String, value: String) -> Param {
        let mut inst = Self::new();
        inst.name = name;
        inst.value = value;
        inst
    }

    pub fn with_unit<S: AsRef<str>, A: AsRef<str>>(mut self, accession: S, name: A) -> Param {
        self.unit = Unit::from_accession(accession.as_ref());
        if matches!(self.unit, Unit::Unknown) {
            self.unit = Unit::from_name(name.as_ref());
        }
        self
    }

    pub fn with_unit_t(mut self, unit: &Unit) -> Param {
        self.unit = *unit;
        self
    }
}

impl ParamLike for Param {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<u32> {
        self.accession
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary
    }

    fn unit(&self) -> Unit {
        self.unit
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ControlledVocabulary {
    MS,
    UO,
    Unknown,
}

const MS_CV: &str = "MS";
const UO_CV: &str = "UO";

impl ControlledVocabulary {
    pub fn prefix(&self) -> Cow<'static, str> {
        match &self {
            Self::MS => Cow::Borrowed(MS_CV),
            Self::UO => Cow::Borrowed(UO_CV),
            Self::Unknown => Cow::Borrowed("?"),
        }
    }

    pub fn as_option(&self) -> Option<Self> {
        match self {
            Self::Unknown => None,
            _ => Some(*self),
        }
    }

    pub fn param<S: Into<String>>(&self, accession: u32, name: S) -> Param {
        let mut param = Param::new();
        param.controlled_vocabulary = Some(*self);
        param.name = name.into();
        param.accession = Some(accession);
        param
    }

    pub fn param_val<S: Into<String>, V: ToString>(
        &self,
        accession: u32,
        name: S,
        value: V,
    ) -> Param {
        let mut param = self.param(accession, name);
        param.value = value.to_string();
        param
    }
}

impl Display for ControlledVocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.prefix())
    }
}

impl FromStr for ControlledVocabulary {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MS" | "PSI-MS" => Ok(Self::MS),
            "UO" => Ok(Self::UO),
            _ => Ok(Self::Unknown),
        }
    }
}

pub type ParamList = Vec<Param>;

pub trait ParamDescribed {
    fn params(&self) -> &ParamList;
    fn params_mut(&mut self) -> &mut ParamList;

    fn add_param(&mut self, param: Param) {
        self.params_mut().push(param);
    }

    fn get_param_by_name(&self, name: &str) -> Option<&Param> {
        self.params().iter().find(|p| p.name == name)
    }

    fn get_param_by_accession(&self, accession: &str) -> Option<&Param> {
        let (cv, acc_num) = curie_to_num(accession);
        self.params()
            .iter()
            .find(|p| p.accession == acc_num && p.controlled_vocabulary == cv)
    }

    /// Find the first parameter carrying `role`
    fn get_param_by_role(&self, role: CvRole) -> Option<&Param> {
        self.params().iter().find(|p| p.role() == Some(role))
    }

    /// Find the first parameter whose role is any of `roles`, in document order
    fn find_param_by_roles(&self, roles: &[CvRole]) -> Option<(CvRole, &Param)> {
        self.params().iter().find_map(|p| match p.role() {
            Some(r) if roles.contains(&r) => Some((r, p)),
            _ => None,
        })
    }
}

#[macro_export]
macro_rules! impl_param_described {
    ($($t:ty), +) => {$(

        impl $crate::params::ParamDescribed for $t {
            fn params(&self) -> &$crate::params::ParamList {
                return &self.params
            }

            fn params_mut(&mut self) -> &mut $crate::params::ParamList {
                return &mut self.params
            }
        }
    )+};
}

/// Units that a term's value might have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Unit {
    MZ,

    Minute,
    Second,
    Millisecond,

    DetectorCounts,

    #[default]
    Unknown,
}

impl Unit {
    pub fn for_param(&self) -> (&'static str, &'static str) {
        match self {
            Self::Millisecond => ("UO:0000028", "millisecond"),
            Self::Second => ("UO:0000010", "second"),
            Self::Minute => ("UO:0000031", "minute"),

            Self::MZ => ("MS:1000040", "m/z"),

            Self::DetectorCounts => ("MS:1000131", "number of detector counts"),

            Self::Unknown => ("", ""),
        }
    }

    pub fn from_name(name: &str) -> Unit {
        match name {
            "millisecond" => Self::Millisecond,
            "second" => Self::Second,
            "minute" => Self::Minute,
            "m/z" => Self::MZ,
            "number of detector counts" => Self::DetectorCounts,
            _ => Unit::Unknown,
        }
    }

    pub fn from_accession(acc: &str) -> Unit {
        match acc {
            "UO:0000028" => Self::Millisecond,
            "UO:0000010" => Self::Second,
            "UO:0000031" => Self::Minute,
            "MS:1000040" => Self::MZ,
            "MS:1000131" => Self::DetectorCounts,
            _ => Unit::Unknown,
        }
    }
}

macro_rules! cv_role_table {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                #[term(cv=$cv:ident, accession=$acc:literal, name=$term:literal)]
                $(#[doc = $doc:literal])*
                $variant:ident,
            )+
        }
    ) => {
        $(#[$meta])*
        pub enum $name {
            $(
                $(#[doc = $doc])*
                $variant,
            )+
        }

        impl $name {
            /// The numeric part of this role's accession
            pub const fn accession(&self) -> u32 {
                match self {
                    $(Self::$variant => $acc,)+
                }
            }

            pub const fn controlled_vocabulary(&self) -> ControlledVocabulary {
                match self {
                    $(Self::$variant => ControlledVocabulary::$cv,)+
                }
            }

            /// The term's preferred name in its vocabulary
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $term,)+
                }
            }

            pub fn from_accession_num(cv: ControlledVocabulary, accession: u32) -> Option<Self> {
                match (cv, accession) {
                    $((ControlledVocabulary::$cv, $acc) => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Look up the role for a CURIE. Unknown accessions are not an error here.
            pub fn from_accession(curie: &str) -> Option<Self> {
                match curie_to_num(curie) {
                    (Some(cv), Some(acc)) => Self::from_accession_num(cv, acc),
                    _ => None,
                }
            }

            pub fn curie(&self) -> String {
                format!("{}:{:07}", self.controlled_vocabulary().prefix(), self.accession())
            }

            pub fn to_param(&self) -> Param {
                self.controlled_vocabulary().param(self.accession(), self.name())
            }

            pub fn to_param_val<V: ToString>(&self, value: V) -> Param {
                self.controlled_vocabulary().param_val(self.accession(), self.name(), value)
            }
        }
    };
}

cv_role_table! {
    /// The semantic roles of the controlled vocabulary terms this crate reads and writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum CvRole {
        #[term(cv=MS, accession=1000511, name="ms level")]
        MsLevel,
        #[term(cv=MS, accession=1000041, name="charge state")]
        ChargeState,
        #[term(cv=MS, accession=1000528, name="lowest observed m/z")]
        LowestObservedMz,
        #[term(cv=MS, accession=1000527, name="highest observed m/z")]
        HighestObservedMz,
        #[term(cv=MS, accession=1000744, name="selected ion m/z")]
        /// The selected ion's m/z, read as the precursor's monoisotopic m/z
        SelectedIonMz,
        #[term(cv=MS, accession=1000827, name="isolation window target m/z")]
        IsolationWindowTargetMz,
        #[term(cv=MS, accession=1000828, name="isolation window lower offset")]
        IsolationWindowLowerOffset,
        #[term(cv=MS, accession=1000829, name="isolation window upper offset")]
        IsolationWindowUpperOffset,
        #[term(cv=MS, accession=1000016, name="scan start time")]
        ScanStartTime,
        #[term(cv=MS, accession=1000927, name="ion injection time")]
        IonInjectionTime,
        #[term(cv=MS, accession=1000514, name="m/z array")]
        MzArray,
        #[term(cv=MS, accession=1000515, name="intensity array")]
        IntensityArray,

        #[term(cv=MS, accession=1000133, name="collision-induced dissociation")]
        CollisionInducedDissociation,
        #[term(cv=MS, accession=1001880, name="in-source collision-induced dissociation")]
        InSourceCollisionInducedDissociation,
        #[term(cv=MS, accession=1000422, name="beam-type collision-induced dissociation")]
        BeamTypeCollisionInducedDissociation,
        #[term(cv=MS, accession=1000598, name="electron transfer dissociation")]
        ElectronTransferDissociation,
        #[term(cv=MS, accession=1000435, name="photodissociation")]
        Photodissociation,
        #[term(cv=MS, accession=1000250, name="electron capture dissociation")]
        ElectronCaptureDissociation,
        #[term(cv=MS, accession=1000599, name="pulsed q dissociation")]
        PulsedQDissociation,

        #[term(cv=MS, accession=1000081, name="quadrupole")]
        Quadrupole,
        #[term(cv=MS, accession=1000291, name="linear ion trap")]
        LinearIonTrap,
        #[term(cv=MS, accession=1000078, name="axial ejection linear ion trap")]
        AxialEjectionLinearIonTrap,
        #[term(cv=MS, accession=1000083, name="radial ejection linear ion trap")]
        RadialEjectionLinearIonTrap,
        #[term(cv=MS, accession=1000082, name="quadrupole ion trap")]
        QuadrupoleIonTrap,
        #[term(cv=MS, accession=1000484, name="orbitrap")]
        Orbitrap,
        #[term(cv=MS, accession=1000084, name="time-of-flight")]
        TimeOfFlight,
        #[term(cv=MS, accession=1000079, name="fourier transform ion cyclotron resonance mass spectrometer")]
        FourierTransformIonCyclotronResonance,
        #[term(cv=MS, accession=1000080, name="magnetic sector")]
        MagneticSector,

        #[term(cv=MS, accession=1000574, name="zlib compression")]
        ZlibCompression,
        #[term(cv=MS, accession=1000576, name="no compression")]
        NoCompression,
        #[term(cv=MS, accession=1000521, name="32-bit float")]
        Float32,
        #[term(cv=MS, accession=1000523, name="64-bit float")]
        Float64,

        #[term(cv=MS, accession=1000129, name="negative scan")]
        NegativeScan,
        #[term(cv=MS, accession=1000130, name="positive scan")]
        PositiveScan,
        #[term(cv=MS, accession=1000127, name="centroid spectrum")]
        CentroidSpectrum,
        #[term(cv=MS, accession=1000128, name="profile spectrum")]
        ProfileSpectrum,

        #[term(cv=MS, accession=1000042, name="peak intensity")]
        PeakIntensity,
        #[term(cv=MS, accession=1000512, name="filter string")]
        /// Free-text, vendor specific description of the acquisition method
        FilterString,
        #[term(cv=MS, accession=1000579, name="MS1 spectrum")]
        MS1Spectrum,
        #[term(cv=MS, accession=1000580, name="MSn spectrum")]
        MSnSpectrum,
        #[term(cv=MS, accession=1000796, name="spectrum title")]
        SpectrumTitle,
        #[term(cv=MS, accession=1000799, name="custom unreleased software tool")]
        CustomSoftware,
    }
}

impl CvRole {
    pub const DISSOCIATION: &'static [CvRole] = &[
        CvRole::CollisionInducedDissociation,
        CvRole::InSourceCollisionInducedDissociation,
        CvRole::BeamTypeCollisionInducedDissociation,
        CvRole::ElectronTransferDissociation,
        CvRole::Photodissociation,
        CvRole::ElectronCaptureDissociation,
        CvRole::PulsedQDissociation,
    ];

    pub const ANALYZER: &'static [CvRole] = &[
        CvRole::Quadrupole,
        CvRole::LinearIonTrap,
        CvRole::AxialEjectionLinearIonTrap,
        CvRole::RadialEjectionLinearIonTrap,
        CvRole::QuadrupoleIonTrap,
        CvRole::Orbitrap,
        CvRole::TimeOfFlight,
        CvRole::FourierTransformIonCyclotronResonance,
        CvRole::MagneticSector,
    ];

    pub fn is_dissociation(&self) -> bool {
        Self::DISSOCIATION.contains(self)
    }

    pub fn is_analyzer(&self) -> bool {
        Self::ANALYZER.contains(self)
    }
}
