//! Detection-category taxonomy.
//!
//! The built-in set is fixed. Deployments can add upper-snake-case categories
//! through `masking.extra_categories`; those resolve to [`Category::Custom`].

use std::fmt;

/// Category of a sensitive span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    // PII
    Person,
    Email,
    Phone,
    Address,
    DateOfBirth,
    IdNumber,
    BankAccount,
    Health,
    // Confidential business data
    Company,
    Project,
    Product,
    Financial,
    Strategy,
    Technical,
    Client,
    /// Deployment-defined category (validated upper-snake-case name).
    Custom(String),
}

impl Category {
    /// All built-in categories, in prompt order.
    pub const BUILTIN: [Category; 15] = [
        Category::Person,
        Category::Email,
        Category::Phone,
        Category::Address,
        Category::DateOfBirth,
        Category::IdNumber,
        Category::BankAccount,
        Category::Health,
        Category::Company,
        Category::Project,
        Category::Product,
        Category::Financial,
        Category::Strategy,
        Category::Technical,
        Category::Client,
    ];

    /// Name used inside placeholder tokens and model output.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Address => "ADDRESS",
            Self::DateOfBirth => "DATE_OF_BIRTH",
            Self::IdNumber => "ID_NUMBER",
            Self::BankAccount => "BANK_ACCOUNT",
            Self::Health => "HEALTH",
            Self::Company => "COMPANY",
            Self::Project => "PROJECT",
            Self::Product => "PRODUCT",
            Self::Financial => "FINANCIAL",
            Self::Strategy => "STRATEGY",
            Self::Technical => "TECHNICAL",
            Self::Client => "CLIENT",
            Self::Custom(name) => name,
        }
    }

    /// Resolve a built-in category name (case-insensitive).
    ///
    /// `IBAN` and `BIC` are folded into [`Category::BankAccount`].
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        match upper.as_str() {
            "IBAN" | "BIC" => return Some(Self::BankAccount),
            "DOB" => return Some(Self::DateOfBirth),
            _ => {}
        }
        Self::BUILTIN.into_iter().find(|c| c.as_str() == upper)
    }

    /// True for personally identifiable information.
    #[must_use]
    pub fn is_pii(&self) -> bool {
        matches!(
            self,
            Self::Person
                | Self::Email
                | Self::Phone
                | Self::Address
                | Self::DateOfBirth
                | Self::IdNumber
                | Self::BankAccount
                | Self::Health
        )
    }

    /// Human-readable plural label for detection summaries.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Person => "Persons",
            Self::Email => "Email addresses",
            Self::Phone => "Phone numbers",
            Self::Address => "Addresses",
            Self::DateOfBirth => "Dates of birth",
            Self::IdNumber => "ID numbers",
            Self::BankAccount => "Bank accounts",
            Self::Health => "Health data",
            Self::Company => "Companies",
            Self::Project => "Projects",
            Self::Product => "Products",
            Self::Financial => "Financial figures",
            Self::Strategy => "Strategies",
            Self::Technical => "Technical details",
            Self::Client => "Clients",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static BUILTIN_SET: [Category; 15] = Category::BUILTIN;

/// Returns true if `name` is usable as a category inside a placeholder token.
#[must_use]
pub fn is_valid_category_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && !name.ends_with('_')
}

/// The set of categories a [`super::Masker`] accepts from the model.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    extra: Vec<Category>,
}

impl Taxonomy {
    /// Taxonomy with additional deployment-defined categories.
    ///
    /// Names are expected to be validated by the config loader; invalid or
    /// built-in names are ignored here.
    #[must_use]
    pub fn with_extra<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extra: Vec<Category> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if !is_valid_category_name(name) || Category::builtin(name).is_some() {
                continue;
            }
            let category = Category::Custom(name.to_string());
            if !extra.contains(&category) {
                extra.push(category);
            }
        }
        Self { extra }
    }

    /// Resolve a category name reported by the masking model.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Category> {
        if let Some(category) = Category::builtin(name) {
            return Some(category);
        }
        let upper = name.trim().to_ascii_uppercase();
        self.extra.iter().find(|c| c.as_str() == upper).cloned()
    }

    /// Every accepted category, built-ins first.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        BUILTIN_SET.iter().chain(self.extra.iter())
    }
}
