//! Where each form control is expected to be found.
//!
//! The stable ids observed on the live form come first; looser
//! placeholder/attribute/text matches follow for when the markup changes.

use crate::driver::Using;
use crate::locator::LocatorSet;

/// Locator sets for every control the pipeline touches.
#[derive(Debug, Clone)]
pub struct FormLocators {
    pub full_name: LocatorSet,
    pub category: LocatorSet,
    pub email: LocatorSet,
    pub member_id: LocatorSet,
    /// Candidate day cells; the first strategy yielding usable cells wins.
    pub day_cells: LocatorSet,
    pub next_period: LocatorSet,
    pub time_slots: LocatorSet,
    /// Each required acknowledgement, resolved individually.
    pub acknowledgements: Vec<LocatorSet>,
    /// Sweep for any other required checkbox.
    pub required_checkboxes: LocatorSet,
    pub submit: LocatorSet,
    pub success_markers: LocatorSet,
}

impl Default for FormLocators {
    fn default() -> Self {
        Self {
            full_name: LocatorSet::new("full name")
                .by(Using::Id, "fieldname2_1")
                .by(Using::XPath, "//input[@placeholder='Nome e Cognome']")
                .by(
                    Using::XPath,
                    "//input[contains(@placeholder, 'Nome') or contains(@placeholder, 'Cognome')]",
                )
                .by(
                    Using::XPath,
                    "//input[@name='nome' or @name='cognome' or @name='nominativo']",
                ),
            category: LocatorSet::new("category")
                .by(Using::ClassName, "ahbfield_service")
                .by(Using::XPath, "//select[contains(@class, 'ahbfield_service')]")
                .by(Using::XPath, "//select[contains(@class, 'tipologia')]")
                .by(Using::XPath, "//select[contains(@class, 'service')]")
                .by(Using::XPath, "//select[@name='tipologia' or @id='tipologia']"),
            email: LocatorSet::new("email")
                .by(Using::Id, "email_1")
                .by(Using::XPath, "//input[@placeholder='Email' or @type='email']")
                .by(Using::XPath, "//input[@name='email' or @id='email']"),
            member_id: LocatorSet::new("member id")
                .by(Using::Id, "fieldname5_1")
                .by(Using::XPath, "//input[contains(@placeholder, 'Matricola')]")
                .by(Using::XPath, "//input[@name='matricola' or @id='matricola']"),
            day_cells: LocatorSet::new("day cells")
                .by(
                    Using::XPath,
                    "//td[not(contains(@class, 'disabled')) and not(contains(@class, 'past')) \
                     and not(contains(@class, 'unavailable'))]",
                )
                .by(Using::XPath, "//td[@class and not(contains(@class, 'disabled'))]")
                .by(Using::XPath, "//td[not(@disabled) and not(contains(@class, 'disabled'))]")
                .by(Using::XPath, "//button[not(@disabled) and not(contains(@class, 'disabled'))]")
                .by(Using::XPath, "//a[not(contains(@class, 'disabled'))]"),
            next_period: LocatorSet::new("next period")
                .by(Using::XPath, "//button[contains(@class, 'next-month')]")
                .by(Using::XPath, "//button[contains(@class, 'next')]")
                .by(Using::XPath, "//a[contains(@class, 'next')]")
                .by(Using::XPath, "//button[contains(text(), '>') or contains(text(), 'Next')]"),
            time_slots: LocatorSet::new("time slots")
                .by(Using::ClassName, "time-slot")
                .by(Using::XPath, "//div[contains(@class, 'time-slot')]")
                .by(Using::XPath, "//button[contains(@class, 'time')]")
                .by(Using::XPath, "//div[contains(@class, 'slot')]")
                .by(Using::XPath, "//button[contains(@class, 'slot')]"),
            acknowledgements: vec![
                LocatorSet::new("terms acknowledgement")
                    .by(Using::Id, "fieldname3_1")
                    .by(
                        Using::XPath,
                        "//input[@type='checkbox'][contains(@name, 'accettazione') \
                         or contains(@name, 'terms')]",
                    ),
                LocatorSet::new("privacy acknowledgement")
                    .by(Using::Id, "fieldname6_1")
                    .by(
                        Using::XPath,
                        "//input[@type='checkbox'][contains(@name, 'trattamento') \
                         or contains(@name, 'privacy')]",
                    ),
            ],
            required_checkboxes: LocatorSet::new("required checkboxes")
                .by(Using::XPath, "//input[@type='checkbox' and @class='field required']"),
            submit: LocatorSet::new("submit")
                .by(
                    Using::XPath,
                    "//button[contains(text(), 'Prenota posto') or contains(text(), 'Prenota')]",
                )
                .by(
                    Using::XPath,
                    "//button[contains(text(), 'Conferma') or contains(text(), 'conferma')]",
                )
                .by(Using::XPath, "//button[@type='submit']")
                .by(Using::XPath, "//input[@type='submit']")
                .by(
                    Using::XPath,
                    "//button[contains(@class, 'submit') or contains(@class, 'prenota')]",
                )
                .by(Using::Id, "submit")
                .by(Using::Name, "submit"),
            success_markers: LocatorSet::new("success markers")
                .by(Using::XPath, "//div[contains(@class, 'success')]")
                .by(Using::XPath, "//div[contains(@class, 'alert-success')]")
                .by(Using::XPath, "//div[contains(text(), 'confermata')]")
                .by(Using::XPath, "//div[contains(text(), 'successo')]")
                .by(Using::XPath, "//p[contains(text(), 'confermata')]")
                .by(Using::XPath, "//span[contains(text(), 'confermata')]")
                .by(Using::XPath, "//*[contains(text(), 'prenotazione confermata')]"),
        }
    }
}
