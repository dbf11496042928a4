//! Typed schemas for the SDTM domains read by the derivations.

use std::fmt;
use std::str::FromStr;

/// How a source column is stored after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    /// Cast to Float64.
    Number,
    /// ISO 8601 date/time text, possibly partial.
    IsoDateTime,
}

/// SDTM domains consumed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SdtmDomain {
    Dm,
    Ds,
    Ex,
    Qs,
    Sv,
    Vs,
    Sc,
    Mh,
    Ae,
    SuppAe,
    Lb,
    SuppLb,
}

/// Declared columns of one domain.
#[derive(Debug, Clone, Copy)]
pub struct DomainSchema {
    /// Columns that must be present.
    pub required: &'static [(&'static str, ColumnKind)],
    /// Columns typed when present.
    pub optional: &'static [(&'static str, ColumnKind)],
}

impl DomainSchema {
    /// Declared kind of `column`; undeclared columns are text.
    pub fn kind(&self, column: &str) -> ColumnKind {
        self.required
            .iter()
            .chain(self.optional)
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map_or(ColumnKind::Text, |(_, kind)| *kind)
    }
}

use ColumnKind::{IsoDateTime as D, Number as N, Text as T};

const SUPP_REQUIRED: &[(&str, ColumnKind)] = &[
    ("STUDYID", T),
    ("RDOMAIN", T),
    ("USUBJID", T),
    ("IDVAR", T),
    ("IDVARVAL", T),
    ("QNAM", T),
    ("QVAL", T),
];

impl SdtmDomain {
    pub const ALL: [SdtmDomain; 12] = [
        SdtmDomain::Dm,
        SdtmDomain::Ds,
        SdtmDomain::Ex,
        SdtmDomain::Qs,
        SdtmDomain::Sv,
        SdtmDomain::Vs,
        SdtmDomain::Sc,
        SdtmDomain::Mh,
        SdtmDomain::Ae,
        SdtmDomain::SuppAe,
        SdtmDomain::Lb,
        SdtmDomain::SuppLb,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            SdtmDomain::Dm => "DM",
            SdtmDomain::Ds => "DS",
            SdtmDomain::Ex => "EX",
            SdtmDomain::Qs => "QS",
            SdtmDomain::Sv => "SV",
            SdtmDomain::Vs => "VS",
            SdtmDomain::Sc => "SC",
            SdtmDomain::Mh => "MH",
            SdtmDomain::Ae => "AE",
            SdtmDomain::SuppAe => "SUPPAE",
            SdtmDomain::Lb => "LB",
            SdtmDomain::SuppLb => "SUPPLB",
        }
    }

    /// Supplemental-qualifier domains are optional inputs.
    pub fn is_supplemental(&self) -> bool {
        matches!(self, SdtmDomain::SuppAe | SdtmDomain::SuppLb)
    }

    /// Parent domain of a supplemental-qualifier domain.
    pub fn parent(&self) -> Option<SdtmDomain> {
        match self {
            SdtmDomain::SuppAe => Some(SdtmDomain::Ae),
            SdtmDomain::SuppLb => Some(SdtmDomain::Lb),
            _ => None,
        }
    }

    pub fn schema(&self) -> DomainSchema {
        match self {
            SdtmDomain::Dm => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("SUBJID", T),
                    ("SITEID", T),
                    ("AGE", N),
                    ("AGEU", T),
                    ("SEX", T),
                    ("RACE", T),
                    ("ETHNIC", T),
                    ("ARM", T),
                    ("ARMCD", T),
                    ("RFSTDTC", D),
                    ("RFENDTC", D),
                ],
                optional: &[("DTHFL", T), ("DTHDTC", D)],
            },
            SdtmDomain::Ds => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("DSSEQ", N),
                    ("DSTERM", T),
                    ("DSDECOD", T),
                    ("DSCAT", T),
                    ("DSSTDTC", D),
                ],
                optional: &[("VISITNUM", N), ("VISIT", T)],
            },
            SdtmDomain::Ex => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("EXTRT", T),
                    ("EXDOSE", N),
                    ("EXSTDTC", D),
                    ("EXENDTC", D),
                ],
                optional: &[("EXSEQ", N), ("VISITNUM", N)],
            },
            SdtmDomain::Qs => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("QSCAT", T),
                    ("QSTESTCD", T),
                    ("QSSTRESN", N),
                    ("VISITNUM", N),
                ],
                optional: &[("QSSEQ", N), ("QSDTC", D)],
            },
            SdtmDomain::Sv => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("VISIT", T),
                    ("VISITNUM", N),
                    ("SVSTDTC", D),
                ],
                optional: &[("SVENDTC", D)],
            },
            SdtmDomain::Vs => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("VSTESTCD", T),
                    ("VSSTRESN", N),
                    ("VISITNUM", N),
                ],
                optional: &[("VSSEQ", N), ("VSDTC", D)],
            },
            SdtmDomain::Sc => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("SCTESTCD", T),
                    ("SCSTRESN", N),
                ],
                optional: &[("SCSEQ", N), ("SCDTC", D)],
            },
            SdtmDomain::Mh => DomainSchema {
                required: &[("STUDYID", T), ("USUBJID", T), ("MHCAT", T), ("MHSTDTC", D)],
                optional: &[("MHSEQ", N), ("MHTERM", T)],
            },
            SdtmDomain::Ae => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("AESEQ", N),
                    ("AETERM", T),
                    ("AEDECOD", T),
                    ("AEBODSYS", T),
                    ("AESTDTC", D),
                    ("AEENDTC", D),
                ],
                optional: &[
                    ("AELLT", T),
                    ("AESEV", T),
                    ("AESER", T),
                    ("AEREL", T),
                    ("AEOUT", T),
                ],
            },
            SdtmDomain::Lb => DomainSchema {
                required: &[
                    ("STUDYID", T),
                    ("USUBJID", T),
                    ("LBSEQ", N),
                    ("LBTESTCD", T),
                    ("LBTEST", T),
                    ("LBCAT", T),
                    ("LBSTRESN", N),
                    ("LBSTNRLO", N),
                    ("LBSTNRHI", N),
                    ("VISIT", T),
                    ("VISITNUM", N),
                    ("LBDTC", D),
                ],
                optional: &[
                    ("LBSTRESC", T),
                    ("LBSTRESU", T),
                    ("LBBLFL", T),
                    ("LBNRIND", T),
                ],
            },
            SdtmDomain::SuppAe | SdtmDomain::SuppLb => DomainSchema {
                required: SUPP_REQUIRED,
                optional: &[("QLABEL", T), ("QORIG", T)],
            },
        }
    }
}

impl fmt::Display for SdtmDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SdtmDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        SdtmDomain::ALL
            .into_iter()
            .find(|domain| domain.code() == code)
            .ok_or_else(|| format!("unsupported domain: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_round_trip_through_codes() {
        for domain in SdtmDomain::ALL {
            assert_eq!(domain.code().parse::<SdtmDomain>(), Ok(domain));
        }
        assert_eq!("suppae".parse::<SdtmDomain>(), Ok(SdtmDomain::SuppAe));
        assert!("XX".parse::<SdtmDomain>().is_err());
    }

    #[test]
    fn undeclared_columns_are_text() {
        let schema = SdtmDomain::Lb.schema();
        assert_eq!(schema.kind("LBSTRESN"), ColumnKind::Number);
        assert_eq!(schema.kind("lbdtc"), ColumnKind::IsoDateTime);
        assert_eq!(schema.kind("LBSPEC"), ColumnKind::Text);
        assert_eq!(SdtmDomain::SuppLb.parent(), Some(SdtmDomain::Lb));
    }
}
