//! ISO 20022 cash-management statements (camt.052 account reports,
//! camt.053 statements, camt.054 notifications) delivered as zip archives.

use std::io::{Read, Seek};

use chrono::NaiveDate;
use tallyfeed_core::money::MoneyError;
use tallyfeed_core::{CanonicalTransaction, Money};
use thiserror::Error;

use crate::adapter::SourceAdapter;
use crate::observer::Observer;
use crate::resolver::{CandidateSources, PayeeResolver};
use crate::util::collapse_whitespace;
use crate::xml::{parse_document, XmlElement, XmlError};

/// Root namespace prefix shared by every supported statement schema.
pub const CAMT_NAMESPACE_PREFIX: &str = "urn:iso:std:iso:20022:tech:xsd:camt.";

/// Elements whose `Ntry` children are bookings.
const ENTRY_CONTAINERS: [&str; 3] = ["Rpt", "Stmt", "Ntfctn"];

const TX_DETAILS: [&str; 2] = ["NtryDtls", "TxDtls"];

#[derive(Error, Debug)]
pub enum CamtError {
    #[error("Not a CAMT document (root namespace '{0}')")]
    NotAStatement(String),
    #[error("Unreadable statement document: {0}")]
    Xml(#[from] XmlError),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid booking date: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An admitted statement document. All lookups inside it use the namespace
/// declared on its root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDocument {
    namespace: String,
    root: XmlElement,
}

impl StatementDocument {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The raw `Ntry` elements, in document order per container kind.
    pub fn entry_elements(&self) -> Vec<&XmlElement> {
        ENTRY_CONTAINERS
            .iter()
            .flat_map(|container| self.root.descendants(&self.namespace, container))
            .flat_map(|container| container.find_all(&self.namespace, &["Ntry"]))
            .collect()
    }

    /// Extracts every entry; entries that lack required fields are reported
    /// to `observer` and left out.
    pub fn entries(&self, observer: &dyn Observer) -> Vec<StatementEntry> {
        self.entry_elements()
            .into_iter()
            .filter_map(|element| match StatementEntry::from_element(element, &self.namespace) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    observer.entry_skipped(&e.to_string());
                    None
                }
            })
            .collect()
    }
}

/// Admits `bytes` only when it is well-formed XML whose root element lives in
/// a CAMT namespace.
pub fn parse_statement(bytes: &[u8]) -> Result<StatementDocument, CamtError> {
    let root = parse_document(bytes)?;
    if !root.namespace.starts_with(CAMT_NAMESPACE_PREFIX) {
        return Err(CamtError::NotAStatement(root.namespace));
    }
    Ok(StatementDocument { namespace: root.namespace.clone(), root })
}

/// Like [`parse_statement`], for callers that only care whether the bytes
/// are a statement.
pub fn try_parse_statement(bytes: &[u8]) -> Option<StatementDocument> {
    parse_statement(bytes).ok()
}

/// Offers every file of a zip archive to [`parse_statement`]. Members that are
/// not statements are reported to `observer` and skipped.
pub fn read_archive<R: Read + Seek>(
    reader: R,
    observer: &dyn Observer,
) -> Result<Vec<StatementDocument>, CamtError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut documents = Vec::new();

    for i in 0..archive.len() {
        let mut file = match archive.by_index(i) {
            Ok(file) => file,
            Err(e) => {
                observer.document_skipped(&format!("member #{i}"), &e.to_string());
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut bytes = Vec::new();
        if let Err(e) = file.read_to_end(&mut bytes) {
            observer.document_skipped(&name, &e.to_string());
            continue;
        }
        match parse_statement(&bytes) {
            Ok(document) => documents.push(document),
            Err(e) => observer.document_skipped(&name, &e.to_string()),
        }
    }

    Ok(documents)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditDebit {
    Credit,
    Debit,
}

impl CreditDebit {
    /// Anything but `DBIT` books as a credit.
    fn from_code(code: &str) -> Self {
        if code == "DBIT" {
            CreditDebit::Debit
        } else {
            CreditDebit::Credit
        }
    }

    /// Role of the counterparty: the creditor for money going out, the debtor
    /// for money coming in.
    fn counterparty_role(self) -> &'static str {
        match self {
            CreditDebit::Debit => "Cdtr",
            CreditDebit::Credit => "Dbtr",
        }
    }
}

/// The fields of one booking that the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementEntry {
    pub booking_date: NaiveDate,
    /// Signed: negative for debits.
    pub amount: Money,
    pub indicator: CreditDebit,
    pub party_name: String,
    pub agent_name: String,
    pub ultimate_party_name: String,
    pub mandate_id: String,
    pub remittance_info: String,
    pub additional_info: String,
}

impl StatementEntry {
    pub fn from_element(entry: &XmlElement, ns: &str) -> Result<Self, CamtError> {
        let booking_date = booking_date(entry, ns)?;

        let amount: Money = entry
            .find_text(ns, &["Amt"])
            .ok_or(CamtError::MissingField("Amt"))?
            .parse()?;
        let indicator = CreditDebit::from_code(
            entry
                .find_text(ns, &["CdtDbtInd"])
                .ok_or(CamtError::MissingField("CdtDbtInd"))?,
        );
        let amount = match indicator {
            CreditDebit::Debit => -amount.abs(),
            CreditDebit::Credit => amount.abs(),
        };

        let role = indicator.counterparty_role();
        let parties = entry.find(ns, &[TX_DETAILS[0], TX_DETAILS[1], "RltdPties"]);
        let agents = entry.find(ns, &[TX_DETAILS[0], TX_DETAILS[1], "RltdAgts"]);
        let ultimate_role = format!("Ultmt{role}");
        let agent_role = format!("{role}Agt");

        let party_name = parties.map(|p| named_party(p, ns, role)).unwrap_or_default();
        let ultimate_party_name = parties
            .map(|p| named_party(p, ns, &ultimate_role))
            .unwrap_or_default();
        let agent_name = agents
            .and_then(|a| a.find_text(ns, &[agent_role.as_str(), "FinInstnId", "Nm"]))
            .unwrap_or_default()
            .to_string();

        let text_at = |path: &[&str]| entry.find_text(ns, path).unwrap_or_default().to_string();

        Ok(StatementEntry {
            booking_date,
            amount,
            indicator,
            party_name,
            agent_name,
            ultimate_party_name,
            mandate_id: text_at(&[TX_DETAILS[0], TX_DETAILS[1], "Refs", "MndtId"]),
            remittance_info: text_at(&[TX_DETAILS[0], TX_DETAILS[1], "RmtInf", "Ustrd"]),
            additional_info: text_at(&["AddtlNtryInf"]),
        })
    }

    /// Counterparty name, its bank, the ultimate party and the mandate id.
    pub fn candidate_sources(&self) -> CandidateSources {
        CandidateSources::from_parts(
            self.party_name.clone(),
            [
                self.agent_name.clone(),
                self.ultimate_party_name.clone(),
                self.mandate_id.clone(),
            ],
        )
    }

    pub fn memo(&self) -> String {
        collapse_whitespace([self.remittance_info.as_str(), self.additional_info.as_str()])
    }
}

fn booking_date(entry: &XmlElement, ns: &str) -> Result<NaiveDate, CamtError> {
    if let Some(date) = entry.find_text(ns, &["BookgDt", "Dt"]) {
        return NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| CamtError::InvalidDate(date.to_string()));
    }
    let timestamp = entry
        .find_text(ns, &["BookgDt", "DtTm"])
        .ok_or(CamtError::MissingField("BookgDt"))?;
    timestamp
        .get(..10)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .ok_or_else(|| CamtError::InvalidDate(timestamp.to_string()))
}

/// `Nm` directly under the role, or under `Pty` (camt.052.001.08 and later).
fn named_party(parties: &XmlElement, ns: &str, role: &str) -> String {
    parties
        .find_text(ns, &[role, "Nm"])
        .or_else(|| parties.find_text(ns, &[role, "Pty", "Nm"]))
        .unwrap_or_default()
        .to_string()
}

pub struct CamtAdapter<'a> {
    resolver: &'a PayeeResolver,
}

impl<'a> CamtAdapter<'a> {
    pub fn new(resolver: &'a PayeeResolver) -> Self {
        Self { resolver }
    }

    /// Normalizes every extractable entry of the documents, in order.
    pub fn normalize_documents(&self, documents: &[StatementDocument]) -> Vec<CanonicalTransaction> {
        let observer = self.resolver.observer();
        documents
            .iter()
            .flat_map(|document| document.entries(observer))
            .map(|entry| self.normalize(&entry))
            .collect()
    }
}

impl SourceAdapter for CamtAdapter<'_> {
    type Raw = StatementEntry;

    fn normalize(&self, raw: &StatementEntry) -> CanonicalTransaction {
        let payee = self.resolver.resolve(&raw.candidate_sources());
        CanonicalTransaction::new(raw.booking_date, payee, raw.memo(), raw.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ObservedEvent, RecordingObserver};
    use crate::rules::{Rule, RuleEntry, RuleSet, RuleStore};
    use std::io::{Cursor, Write};
    use std::sync::Arc;

    const NS_052: &str = "urn:iso:std:iso:20022:tech:xsd:camt.052.001.02";

    const SAMPLE_CAMT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.052.001.02" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <BkToCstmrAcctRpt>
    <GrpHdr><MsgId>052D2024011500001</MsgId></GrpHdr>
    <Rpt>
      <Id>2024-01-15</Id>
      <Ntry>
        <Amt Ccy="EUR">49.99</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <Sts>BOOK</Sts>
        <BookgDt><Dt>2024-01-15</Dt></BookgDt>
        <NtryDtls>
          <TxDtls>
            <Refs><MndtId>MNDT-778899</MndtId></Refs>
            <RltdPties>
              <Dbtr><Nm>Erika Mustermann</Nm></Dbtr>
              <Cdtr><Nm>Stadtwerke Musterstadt</Nm></Cdtr>
              <UltmtCdtr><Nm>Stadtwerke Energie GmbH</Nm></UltmtCdtr>
            </RltdPties>
            <RltdAgts>
              <DbtrAgt><FinInstnId><Nm>Sparkasse Musterstadt</Nm></FinInstnId></DbtrAgt>
              <CdtrAgt><FinInstnId><Nm>Volksbank Mitte</Nm></FinInstnId></CdtrAgt>
            </RltdAgts>
            <RmtInf><Ustrd>Abschlag Strom
              Januar 2024</Ustrd></RmtInf>
          </TxDtls>
        </NtryDtls>
        <AddtlNtryInf>LASTSCHRIFT</AddtlNtryInf>
      </Ntry>
      <Ntry>
        <Amt Ccy="EUR">1500.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <BookgDt><Dt>2024-01-31</Dt></BookgDt>
        <NtryDtls>
          <TxDtls>
            <RltdPties>
              <Dbtr><Nm>ACME GmbH</Nm></Dbtr>
              <Cdtr><Nm>Erika Mustermann</Nm></Cdtr>
            </RltdPties>
            <RltdAgts>
              <DbtrAgt><FinInstnId><Nm>Deutsche Bank</Nm></FinInstnId></DbtrAgt>
            </RltdAgts>
            <RmtInf><Ustrd>Gehalt Januar</Ustrd></RmtInf>
          </TxDtls>
        </NtryDtls>
        <AddtlNtryInf>GUTSCHRIFT</AddtlNtryInf>
      </Ntry>
    </Rpt>
  </BkToCstmrAcctRpt>
</Document>
"#;

    fn resolver(entries: Vec<RuleEntry>) -> PayeeResolver {
        PayeeResolver::with_tracing(RuleStore::build(Some(RuleSet::new(entries)), None).unwrap())
    }

    fn lit(label: &str, prefix: &str) -> RuleEntry {
        RuleEntry::new(label, Rule::Literal(prefix.to_string()))
    }

    fn sample_entries() -> Vec<StatementEntry> {
        let doc = try_parse_statement(SAMPLE_CAMT.as_bytes()).unwrap();
        doc.entries(&RecordingObserver::new())
    }

    fn zip_of(files: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            for (name, data) in files {
                writer
                    .start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.set_position(0);
        buf
    }

    // ── admission ─────────────────────────────────────────────────────────────

    #[test]
    fn admits_camt_and_records_namespace() {
        let doc = try_parse_statement(SAMPLE_CAMT.as_bytes()).unwrap();
        assert_eq!(doc.namespace(), NS_052);
        assert_eq!(doc.entry_elements().len(), 2);
    }

    #[test]
    fn foreign_document_yields_nothing() {
        let pain = br#"<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pain.001.001.03"><Rpt><Ntry/></Rpt></Document>"#;
        assert!(try_parse_statement(pain).is_none());
        assert!(matches!(parse_statement(pain), Err(CamtError::NotAStatement(_))));
    }

    #[test]
    fn unparsable_content_yields_nothing() {
        assert!(try_parse_statement(b"not xml at all").is_none());
        assert!(try_parse_statement(b"<Document xmlns=\"urn:iso:std:iso:20022:tech:xsd:camt.052\"><Rpt>").is_none());
        assert!(try_parse_statement(&[0xff, 0xfe, 0x00]).is_none());
        assert!(try_parse_statement(b"<Document><Rpt/></Document>").is_none());
    }

    #[test]
    fn prefixed_root_is_admitted() {
        let xml = r#"<c:Document xmlns:c="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02"><c:BkToCstmrStmt><c:Stmt>
            <c:Ntry><c:Amt>5</c:Amt><c:CdtDbtInd>DBIT</c:CdtDbtInd><c:BookgDt><c:Dt>2024-03-01</c:Dt></c:BookgDt></c:Ntry>
        </c:Stmt></c:BkToCstmrStmt></c:Document>"#;
        let doc = try_parse_statement(xml.as_bytes()).unwrap();
        let entries = doc.entries(&RecordingObserver::new());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, "-5".parse().unwrap());
    }

    #[test]
    fn entries_in_another_namespace_are_ignored() {
        let xml = r#"<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.052.001.02"><Rpt>
            <o:Ntry xmlns:o="urn:other"><o:Amt>1</o:Amt></o:Ntry>
        </Rpt></Document>"#;
        let doc = try_parse_statement(xml.as_bytes()).unwrap();
        assert!(doc.entry_elements().is_empty());
    }

    // ── entry extraction ──────────────────────────────────────────────────────

    #[test]
    fn debit_entry_uses_creditor_side() {
        let entries = sample_entries();
        let debit = &entries[0];
        assert_eq!(debit.indicator, CreditDebit::Debit);
        assert_eq!(debit.booking_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(debit.amount, "-49.99".parse().unwrap());
        assert_eq!(debit.party_name, "Stadtwerke Musterstadt");
        assert_eq!(debit.agent_name, "Volksbank Mitte");
        assert_eq!(debit.ultimate_party_name, "Stadtwerke Energie GmbH");
        assert_eq!(debit.mandate_id, "MNDT-778899");
    }

    #[test]
    fn credit_entry_uses_debtor_side() {
        let entries = sample_entries();
        let credit = &entries[1];
        assert_eq!(credit.indicator, CreditDebit::Credit);
        assert_eq!(credit.amount, "1500.00".parse().unwrap());
        assert_eq!(credit.party_name, "ACME GmbH");
        assert_eq!(credit.agent_name, "Deutsche Bank");
        assert_eq!(credit.ultimate_party_name, "");
        assert_eq!(credit.mandate_id, "");
    }

    #[test]
    fn candidate_order_and_memo() {
        let entries = sample_entries();
        assert_eq!(
            entries[0].candidate_sources().as_slice(),
            [
                "Stadtwerke Musterstadt",
                "Volksbank Mitte",
                "Stadtwerke Energie GmbH",
                "MNDT-778899"
            ]
        );
        assert_eq!(entries[0].memo(), "Abschlag Strom Januar 2024 LASTSCHRIFT");
        assert_eq!(entries[1].memo(), "Gehalt Januar GUTSCHRIFT");
    }

    #[test]
    fn party_name_under_pty_element() {
        let xml = format!(
            r#"<Document xmlns="{NS_052}"><Rpt><Ntry><Amt>3.10</Amt><CdtDbtInd>CRDT</CdtDbtInd>
            <BookgDt><DtTm>2024-02-29T10:15:00+01:00</DtTm></BookgDt>
            <NtryDtls><TxDtls><RltdPties><Dbtr><Pty><Nm>Max Muster</Nm></Pty></Dbtr></RltdPties></TxDtls></NtryDtls>
            </Ntry></Rpt></Document>"#
        );
        let doc = try_parse_statement(xml.as_bytes()).unwrap();
        let entries = doc.entries(&RecordingObserver::new());
        assert_eq!(entries[0].party_name, "Max Muster");
        assert_eq!(entries[0].booking_date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(entries[0].memo(), "");
    }

    #[test]
    fn incomplete_entry_is_skipped_and_reported() {
        let xml = format!(
            r#"<Document xmlns="{NS_052}"><Rpt>
            <Ntry><Amt>1.00</Amt><CdtDbtInd>DBIT</CdtDbtInd></Ntry>
            <Ntry><Amt>2.00</Amt><CdtDbtInd>DBIT</CdtDbtInd><BookgDt><Dt>2024-01-02</Dt></BookgDt></Ntry>
            <Ntry><Amt>zwei</Amt><CdtDbtInd>DBIT</CdtDbtInd><BookgDt><Dt>2024-01-02</Dt></BookgDt></Ntry>
            </Rpt></Document>"#
        );
        let doc = try_parse_statement(xml.as_bytes()).unwrap();
        let rec = RecordingObserver::new();
        let entries = doc.entries(&rec);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, "-2.00".parse().unwrap());
        let skipped = rec
            .events()
            .into_iter()
            .filter(|e| matches!(e, ObservedEvent::EntrySkipped { .. }))
            .count();
        assert_eq!(skipped, 2);
    }

    // ── normalization ─────────────────────────────────────────────────────────

    #[test]
    fn normalize_resolves_payee_from_any_candidate() {
        let r = resolver(vec![lit("Utilities", "stadtwerke"), lit("Employer", "acme")]);
        let doc = try_parse_statement(SAMPLE_CAMT.as_bytes()).unwrap();
        let txs = CamtAdapter::new(&r).normalize_documents(&[doc]);

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].payee(), "Utilities");
        assert_eq!(txs[0].outflow(), Some("49.99".parse().unwrap()));
        assert_eq!(txs[0].formatted_date(), "01/15/24");
        assert_eq!(txs[1].payee(), "Employer");
        assert_eq!(txs[1].inflow(), Some("1500.00".parse().unwrap()));
        assert_eq!(txs[1].category(), "");
    }

    #[test]
    fn latin1_statement_resolves_umlaut_payee() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
<Document xmlns=\"urn:iso:std:iso:20022:tech:xsd:camt.052.001.02\"><Rpt>\
<Ntry><Amt>3.20</Amt><CdtDbtInd>DBIT</CdtDbtInd><BookgDt><Dt>2024-02-03</Dt></BookgDt>\
<NtryDtls><TxDtls><RltdPties><Cdtr><Nm>B\xE4ckerei Schr\xF6der</Nm></Cdtr></RltdPties></TxDtls></NtryDtls>\
</Ntry></Rpt></Document>";
        let doc = try_parse_statement(xml).unwrap();
        let entries = doc.entries(&RecordingObserver::new());
        assert_eq!(entries[0].party_name, "Bäckerei Schröder");

        let r = resolver(vec![lit("Bakery", "bäckerei")]);
        assert_eq!(CamtAdapter::new(&r).normalize(&entries[0]).payee(), "Bakery");
    }

    #[test]
    fn normalize_matches_mandate_id() {
        let r = resolver(vec![RuleEntry::new("Power", Rule::Regex(r"MNDT-\d+".to_string()))]);
        let entries = sample_entries();
        assert_eq!(CamtAdapter::new(&r).normalize(&entries[0]).payee(), "Power");
    }

    #[test]
    fn unmatched_entry_falls_back_to_party_name() {
        let r = resolver(vec![]);
        let entries = sample_entries();
        assert_eq!(CamtAdapter::new(&r).normalize(&entries[1]).payee(), "ACME GmbH");
    }

    // ── archives ──────────────────────────────────────────────────────────────

    #[test]
    fn archive_skips_foreign_members() {
        let archive = zip_of(&[
            ("report.xml", SAMPLE_CAMT.as_bytes()),
            ("readme.txt", &b"hello"[..]),
            ("other.xml", &b"<Document xmlns=\"urn:example\"/>"[..]),
        ]);
        let rec = RecordingObserver::new();
        let docs = read_archive(archive, &rec).unwrap();

        assert_eq!(docs.len(), 1);
        let skipped: Vec<_> = rec
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::DocumentSkipped { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, ["readme.txt", "other.xml"]);
    }

    #[test]
    fn archive_documents_keep_their_own_namespace() {
        let ns_053 = "urn:iso:std:iso:20022:tech:xsd:camt.053.001.04";
        let second = format!(
            r#"<Document xmlns="{ns_053}"><BkToCstmrStmt><Stmt><Ntry><Amt>7</Amt><CdtDbtInd>CRDT</CdtDbtInd>
            <BookgDt><Dt>2024-04-01</Dt></BookgDt></Ntry></Stmt></BkToCstmrStmt></Document>"#
        );
        let archive = zip_of(&[("a.xml", SAMPLE_CAMT.as_bytes()), ("b.xml", second.as_bytes())]);
        let docs = read_archive(archive, &RecordingObserver::new()).unwrap();

        assert_eq!(docs[0].namespace(), NS_052);
        assert_eq!(docs[1].namespace(), ns_053);
        let r = PayeeResolver::new(
            RuleStore::build(Some(RuleSet::default()), None).unwrap(),
            Arc::new(RecordingObserver::new()),
        );
        assert_eq!(CamtAdapter::new(&r).normalize_documents(&docs).len(), 3);
    }

    #[test]
    fn archive_that_is_not_a_zip_fails() {
        let result = read_archive(Cursor::new(b"plain text".to_vec()), &RecordingObserver::new());
        assert!(matches!(result, Err(CamtError::Archive(_))));
    }
}
