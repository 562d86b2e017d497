/// Scope passed explicitly to every store call.
///
/// Background jobs run under [`TenantContext::system`], which sees every
/// company. A company-scoped context only sees rows owned by that company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    company_id: Option<i64>,
    actor: String,
}

impl TenantContext {
    #[must_use]
    pub fn system() -> Self {
        Self {
            company_id: None,
            actor: "system".to_string(),
        }
    }

    #[must_use]
    pub fn for_company(company_id: i64) -> Self {
        Self {
            company_id: Some(company_id),
            actor: format!("company:{company_id}"),
        }
    }

    #[must_use]
    pub fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Whether rows owned by `company_id` are visible in this context.
    #[must_use]
    pub fn allows(&self, company_id: i64) -> bool {
        match self.company_id {
            Some(scoped) => scoped == company_id,
            None => true,
        }
    }
}
