/// Store-wide settings shared by every session.
#[derive(Clone, Debug)]
pub struct Conventions {
    pub database: String,
    /// Top-level field that receives the document id during conversion.
    pub identity_property: Option<String>,
    pub max_revisions_page_size: usize,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            identity_property: Some("Id".to_string()),
            max_revisions_page_size: 1024,
        }
    }
}

impl Conventions {
    pub fn builder() -> ConventionsBuilder {
        ConventionsBuilder::default()
    }
}

#[derive(Default)]
pub struct ConventionsBuilder {
    database: Option<String>,
    identity_property: Option<Option<String>>,
    max_revisions_page_size: Option<usize>,
}

impl ConventionsBuilder {
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn identity_property(mut self, property: impl Into<String>) -> Self {
        self.identity_property = Some(Some(property.into()));
        self
    }

    /// Leave converted entities without an injected id field.
    pub fn no_identity_property(mut self) -> Self {
        self.identity_property = Some(None);
        self
    }

    pub fn max_revisions_page_size(mut self, size: usize) -> Self {
        self.max_revisions_page_size = Some(size);
        self
    }

    pub fn build(self) -> Conventions {
        let defaults = Conventions::default();
        Conventions {
            database: self.database.unwrap_or(defaults.database),
            identity_property: self
                .identity_property
                .unwrap_or(defaults.identity_property),
            max_revisions_page_size: self
                .max_revisions_page_size
                .unwrap_or(defaults.max_revisions_page_size),
        }
    }
}
