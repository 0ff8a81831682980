//! Built-in numbering plan: calling codes, national number lengths and
//! English prefix descriptions.
//!
//! Coverage is deliberately small. Regions sharing a calling code are listed
//! most specific first; a region with `areas_exclusive` only claims numbers
//! whose prefix appears in its `areas` table.

/// Validation rule for the national significant number (NSN).
#[derive(Debug, Clone, Copy)]
pub(crate) enum NsnRule {
    /// Any of the listed lengths.
    Lengths(&'static [usize]),
    /// North American Numbering Plan: `NXX NXX XXXX`.
    Nanp,
    /// Ten digits, or eleven with the legacy mobile `1` prefix.
    Mexico,
}

#[derive(Debug)]
pub(crate) struct Region {
    pub calling_code: u16,
    /// ISO 3166-1 alpha-2 code.
    pub iso: &'static str,
    /// English country name.
    pub name: &'static str,
    pub rule: NsnRule,
    pub areas: &'static [(&'static str, &'static str)],
    pub areas_exclusive: bool,
}

impl Region {
    pub fn is_valid(&self, nsn: &str) -> bool {
        let bytes = nsn.as_bytes();
        match self.rule {
            NsnRule::Lengths(lengths) => lengths.contains(&bytes.len()),
            NsnRule::Nanp => {
                bytes.len() == 10
                    && (b'2'..=b'9').contains(&bytes[0])
                    && (b'2'..=b'9').contains(&bytes[3])
            }
            NsnRule::Mexico => bytes.len() == 10 || (bytes.len() == 11 && bytes[0] == b'1'),
        }
    }

    /// The part of the NSN that carries geographic information.
    pub fn geographic_number<'a>(&self, nsn: &'a str) -> &'a str {
        match self.rule {
            NsnRule::Mexico if nsn.len() == 11 => &nsn[1..],
            _ => nsn,
        }
    }

    /// Most specific area description for `nsn`, if any.
    pub fn describe(&self, nsn: &str) -> Option<&'static str> {
        let number = self.geographic_number(nsn);
        self.areas
            .iter()
            .filter(|(prefix, _)| number.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, description)| *description)
    }
}

/// True if `code` is a calling code in the plan.
pub(crate) fn is_calling_code(code: u16) -> bool {
    REGIONS.iter().any(|region| region.calling_code == code)
}

/// Region that owns `nsn` under calling code `code`.
pub(crate) fn region_for(code: u16, nsn: &str) -> Option<&'static Region> {
    let mut fallback = None;
    for region in REGIONS.iter().filter(|region| region.calling_code == code) {
        if region.areas_exclusive {
            if region.describe(nsn).is_some() {
                return Some(region);
            }
        } else if fallback.is_none() {
            fallback = Some(region);
        }
    }
    fallback
}

pub(crate) static REGIONS: &[Region] = &[
    Region {
        calling_code: 1,
        iso: "CA",
        name: "Canada",
        rule: NsnRule::Nanp,
        areas: CANADA_AREAS,
        areas_exclusive: true,
    },
    Region {
        calling_code: 1,
        iso: "US",
        name: "United States",
        rule: NsnRule::Nanp,
        areas: US_AREAS,
        areas_exclusive: false,
    },
    Region {
        calling_code: 52,
        iso: "MX",
        name: "Mexico",
        rule: NsnRule::Mexico,
        areas: MEXICO_AREAS,
        areas_exclusive: false,
    },
    Region {
        calling_code: 44,
        iso: "GB",
        name: "United Kingdom",
        rule: NsnRule::Lengths(&[9, 10]),
        areas: &[("20", "London"), ("161", "Manchester"), ("131", "Edinburgh"), ("121", "Birmingham")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 49,
        iso: "DE",
        name: "Germany",
        rule: NsnRule::Lengths(&[6, 7, 8, 9, 10, 11, 12, 13]),
        areas: &[("30", "Berlin"), ("40", "Hamburg"), ("89", "Munich"), ("69", "Frankfurt am Main")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 33,
        iso: "FR",
        name: "France",
        rule: NsnRule::Lengths(&[9]),
        areas: &[("1", "Paris")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 34,
        iso: "ES",
        name: "Spain",
        rule: NsnRule::Lengths(&[9]),
        areas: &[("91", "Madrid"), ("93", "Barcelona")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 39,
        iso: "IT",
        name: "Italy",
        rule: NsnRule::Lengths(&[6, 7, 8, 9, 10, 11]),
        areas: &[("06", "Rome"), ("02", "Milan")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 31,
        iso: "NL",
        name: "Netherlands",
        rule: NsnRule::Lengths(&[9]),
        areas: &[("20", "Amsterdam"), ("10", "Rotterdam")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 353,
        iso: "IE",
        name: "Ireland",
        rule: NsnRule::Lengths(&[7, 8, 9]),
        areas: &[("1", "Dublin")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 7,
        iso: "RU",
        name: "Russia",
        rule: NsnRule::Lengths(&[10]),
        areas: &[("495", "Moscow"), ("812", "Saint Petersburg")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 27,
        iso: "ZA",
        name: "South Africa",
        rule: NsnRule::Lengths(&[9]),
        areas: &[("11", "Johannesburg"), ("21", "Cape Town")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 502,
        iso: "GT",
        name: "Guatemala",
        rule: NsnRule::Lengths(&[8]),
        areas: &[],
        areas_exclusive: false,
    },
    Region {
        calling_code: 506,
        iso: "CR",
        name: "Costa Rica",
        rule: NsnRule::Lengths(&[8]),
        areas: &[],
        areas_exclusive: false,
    },
    Region {
        calling_code: 51,
        iso: "PE",
        name: "Peru",
        rule: NsnRule::Lengths(&[8, 9]),
        areas: &[("1", "Lima")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 54,
        iso: "AR",
        name: "Argentina",
        rule: NsnRule::Lengths(&[10, 11]),
        areas: &[("11", "Buenos Aires")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 55,
        iso: "BR",
        name: "Brazil",
        rule: NsnRule::Lengths(&[10, 11]),
        areas: &[("11", "São Paulo"), ("21", "Rio de Janeiro"), ("61", "Brasília")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 56,
        iso: "CL",
        name: "Chile",
        rule: NsnRule::Lengths(&[9]),
        areas: &[("2", "Santiago")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 57,
        iso: "CO",
        name: "Colombia",
        rule: NsnRule::Lengths(&[8, 10]),
        areas: &[],
        areas_exclusive: false,
    },
    Region {
        calling_code: 61,
        iso: "AU",
        name: "Australia",
        rule: NsnRule::Lengths(&[9]),
        areas: &[("2", "New South Wales"), ("3", "Victoria"), ("7", "Queensland"), ("8", "Western Australia")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 64,
        iso: "NZ",
        name: "New Zealand",
        rule: NsnRule::Lengths(&[8, 9, 10]),
        areas: &[("9", "Auckland"), ("4", "Wellington")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 81,
        iso: "JP",
        name: "Japan",
        rule: NsnRule::Lengths(&[9, 10]),
        areas: &[("3", "Tokyo"), ("6", "Osaka")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 82,
        iso: "KR",
        name: "South Korea",
        rule: NsnRule::Lengths(&[8, 9, 10]),
        areas: &[("2", "Seoul")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 86,
        iso: "CN",
        name: "China",
        rule: NsnRule::Lengths(&[10, 11]),
        areas: &[("10", "Beijing"), ("21", "Shanghai")],
        areas_exclusive: false,
    },
    Region {
        calling_code: 91,
        iso: "IN",
        name: "India",
        rule: NsnRule::Lengths(&[10]),
        areas: &[("11", "New Delhi"), ("22", "Mumbai")],
        areas_exclusive: false,
    },
];

const CANADA_AREAS: &[(&str, &str)] = &[
    ("204", "Manitoba"),
    ("226", "Ontario"),
    ("236", "British Columbia"),
    ("249", "Ontario"),
    ("250", "British Columbia"),
    ("263", "Quebec"),
    ("289", "Ontario"),
    ("306", "Saskatchewan"),
    ("343", "Ontario"),
    ("354", "Quebec"),
    ("365", "Ontario"),
    ("367", "Quebec"),
    ("368", "Alberta"),
    ("382", "Ontario"),
    ("403", "Alberta"),
    ("416", "Ontario"),
    ("418", "Quebec"),
    ("428", "New Brunswick"),
    ("431", "Manitoba"),
    ("437", "Ontario"),
    ("438", "Quebec"),
    ("450", "Quebec"),
    ("468", "Quebec"),
    ("474", "Saskatchewan"),
    ("506", "New Brunswick"),
    ("514", "Quebec"),
    ("519", "Ontario"),
    ("548", "Ontario"),
    ("579", "Quebec"),
    ("581", "Quebec"),
    ("584", "Manitoba"),
    ("587", "Alberta"),
    ("604", "British Columbia"),
    ("613", "Ontario"),
    ("639", "Saskatchewan"),
    ("647", "Ontario"),
    ("672", "British Columbia"),
    ("683", "Ontario"),
    ("705", "Ontario"),
    ("709", "Newfoundland and Labrador"),
    ("742", "Ontario"),
    ("753", "Ontario"),
    ("778", "British Columbia"),
    ("780", "Alberta"),
    ("782", "Nova Scotia"),
    ("807", "Ontario"),
    ("819", "Quebec"),
    ("825", "Alberta"),
    ("867", "Northern Canada"),
    ("873", "Quebec"),
    ("879", "Newfoundland and Labrador"),
    ("902", "Nova Scotia"),
    ("905", "Ontario"),
];

const US_AREAS: &[(&str, &str)] = &[
    ("201", "New Jersey"),
    ("202", "Washington D.C."),
    ("206", "Washington"),
    ("212", "New York"),
    ("213", "California"),
    ("214", "Texas"),
    ("305", "Florida"),
    ("312", "Illinois"),
    ("313", "Michigan"),
    ("404", "Georgia"),
    ("415", "California"),
    ("503", "Oregon"),
    ("512", "Texas"),
    ("602", "Arizona"),
    ("617", "Massachusetts"),
    ("650", "California"),
    ("702", "Nevada"),
    ("713", "Texas"),
    ("718", "New York"),
    ("720", "Colorado"),
    ("808", "Hawaii"),
    ("907", "Alaska"),
];

const MEXICO_AREAS: &[(&str, &str)] = &[
    ("55", "Mexico City"),
    ("33", "Guadalajara, Jalisco"),
    ("81", "Monterrey, Nuevo León"),
    ("222", "Puebla"),
    ("442", "Querétaro"),
    ("664", "Tijuana, Baja California"),
    ("777", "Cuernavaca, Morelos"),
    ("998", "Cancún, Quintana Roo"),
];
