//! 病历工作台
//!
//! 持有当前患者、病历、九宫格与AI分析的录入状态，负责新建、加载、保存、
//! 删除与分析。用户每次修改后把表单镜像到本地草稿；保存成功或新建患者时
//! 清除草稿。

use chrono::{DateTime, Utc};
use maizhen_client::{AnalysisApi, RecordApi};
use maizhen_core::utils::is_blank;
use maizhen_core::{
    AnalysisRequest, AnalysisResult, MaizhenError, MedicalRecord, Medicine, PatientInfo,
    PatientInfoDraft, PracticeMode, PulseGrid, PulsePosition, RecordDetail, RecordPermissions,
    Result, SaveReceipt, ShadowingTab, SimilarRecord,
};
use maizhen_prescription::{medicines_to_text, text_to_medicines, AnnotationSource, MedicineEditor};
use maizhen_pulse::{PulseGridModel, SimilarityQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::assembler::{assemble, overlay_patient_draft, RecordForm};
use crate::loads::{LoadFamily, LoadGate, LoadTicket};
use crate::local_store::{LocalStore, Preferences};

/// 已发出的相似病历搜索
///
/// 不借用工作台，搜索进行中仍可继续编辑九宫格；结果交回
/// [`Workbench::apply_similarity`]，期间有更新的搜索时被丢弃。
pub struct PendingSimilarity {
    records: Arc<dyn RecordApi>,
    query: SimilarityQuery,
}

impl PendingSimilarity {
    pub fn token(&self) -> u64 {
        self.query.token
    }

    pub fn grid(&self) -> &PulseGrid {
        &self.query.grid
    }

    pub async fn run(&self) -> Result<Vec<SimilarRecord>> {
        self.records.search_similar(&self.query.grid).await
    }
}

/// 病历工作台
pub struct Workbench {
    records: Arc<dyn RecordApi>,
    analysis: Arc<dyn AnalysisApi>,
    store: LocalStore,
    patient_info: PatientInfo,
    medical_record: MedicalRecord,
    medicines: MedicineEditor,
    pulse: PulseGridModel,
    ai_analysis: Option<AnalysisResult>,
    record_id: Option<i64>,
    permissions: RecordPermissions,
    preferences: Preferences,
    loads: LoadGate,
    last_update: DateTime<Utc>,
    background: Vec<JoinHandle<()>>,
}

impl Workbench {
    /// 创建工作台，读取偏好并恢复上次的草稿
    pub fn new(
        records: Arc<dyn RecordApi>,
        analysis: Arc<dyn AnalysisApi>,
        store: LocalStore,
        debounce: Duration,
    ) -> Self {
        let preferences = store.load_preferences();
        let mut workbench = Self {
            records,
            analysis,
            store,
            patient_info: PatientInfo::default(),
            medical_record: MedicalRecord::default(),
            medicines: MedicineEditor::default(),
            pulse: PulseGridModel::new(debounce),
            ai_analysis: None,
            record_id: None,
            permissions: RecordPermissions::default(),
            preferences,
            loads: LoadGate::new(),
            last_update: Utc::now(),
            background: Vec::new(),
        };

        if let Some(draft) = workbench.store.load_draft() {
            info!("Restoring local draft for {:?}", draft.patient_info.name);
            workbench.apply_form(draft);
        }
        workbench
    }

    // ---- 状态读取 ----

    pub fn patient_info(&self) -> &PatientInfo {
        &self.patient_info
    }

    pub fn medical_record(&self) -> &MedicalRecord {
        &self.medical_record
    }

    pub fn medicines(&self) -> &MedicineEditor {
        &self.medicines
    }

    pub fn pulse(&self) -> &PulseGridModel {
        &self.pulse
    }

    pub fn ai_analysis(&self) -> Option<&AnalysisResult> {
        self.ai_analysis.as_ref()
    }

    /// 当前加载的病历ID
    pub fn record_id(&self) -> Option<i64> {
        self.record_id
    }

    pub fn permissions(&self) -> &RecordPermissions {
        &self.permissions
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// 病历列表最后一次变化（保存或删除）的时间
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// 当前表单快照，药物来自编辑器
    pub fn form(&self) -> RecordForm {
        RecordForm {
            patient_info: self.patient_info.clone(),
            medical_record: MedicalRecord {
                medicines: self.medicines.medicines().to_vec(),
                ..self.medical_record.clone()
            },
            pulse_grid: self.pulse.grid().clone(),
            ai_analysis: self.ai_analysis.clone(),
        }
    }

    // ---- 用户编辑 ----

    pub fn update_patient(&mut self, edit: impl FnOnce(&mut PatientInfo)) {
        edit(&mut self.patient_info);
        self.mirror_draft();
    }

    /// 修改主诉、备注等文本字段；药物请用 [`update_medicines`](Self::update_medicines)
    pub fn update_record(&mut self, edit: impl FnOnce(&mut MedicalRecord)) {
        edit(&mut self.medical_record);
        self.mirror_draft();
    }

    pub fn update_medicines<R>(&mut self, edit: impl FnOnce(&mut MedicineEditor) -> R) -> R {
        let result = edit(&mut self.medicines);
        self.mirror_draft();
        result
    }

    pub fn set_pulse_cell(&mut self, position: PulsePosition, value: impl Into<String>, now: Instant) {
        self.pulse.set_cell(position, value, now);
        self.mirror_draft();
    }

    pub fn set_pulse_overall(&mut self, value: impl Into<String>, now: Instant) {
        self.pulse.set_overall(value, now);
        self.mirror_draft();
    }

    /// 推进九宫格防抖计时，到期且非空时返回待发出的搜索
    pub fn poll_similarity(&mut self, now: Instant) -> Option<PendingSimilarity> {
        self.pulse.poll(now).map(|query| PendingSimilarity {
            records: Arc::clone(&self.records),
            query,
        })
    }

    /// 写入搜索结果，过期的搜索返回 false
    pub fn apply_similarity(&mut self, token: u64, outcome: Result<Vec<SimilarRecord>>) -> bool {
        self.pulse.apply_results(token, outcome)
    }

    /// 九宫格防抖到期时搜索相似病历并等待结果
    pub async fn search_similar_if_due(&mut self, now: Instant) -> bool {
        let Some(pending) = self.poll_similarity(now) else {
            return false;
        };
        let outcome = pending.run().await;
        self.apply_similarity(pending.token(), outcome);
        true
    }

    /// 把表单镜像到本地草稿，全部为空时不写
    fn mirror_draft(&self) {
        let form = self.form();
        if !form.is_worth_saving() {
            return;
        }
        if let Err(e) = self.store.save_draft(&form) {
            warn!("Failed to save local draft: {}", e);
        }
    }

    fn clear_draft(&self) {
        if let Err(e) = self.store.clear_draft() {
            warn!("Failed to clear local draft: {}", e);
        }
    }

    fn apply_form(&mut self, form: RecordForm) {
        let RecordForm {
            patient_info,
            mut medical_record,
            pulse_grid,
            ai_analysis,
        } = form;
        self.medicines.replace(std::mem::take(&mut medical_record.medicines));
        self.patient_info = patient_info;
        self.medical_record = medical_record;
        self.pulse.load(pulse_grid);
        self.ai_analysis = ai_analysis;
    }

    fn reset_form(&mut self) {
        self.apply_form(RecordForm::default());
        self.medicines.set_read_only(false);
        self.record_id = None;
        self.permissions = RecordPermissions::default();
    }

    // ---- 新建 ----

    /// 新建患者：清空表单与草稿，并放弃在途的加载
    pub fn new_patient(&mut self) {
        self.loads.cancel_all();
        self.reset_form();
        self.clear_draft();
    }

    // ---- 加载 ----

    pub fn begin_load_patient(&mut self, patient_id: i64) -> LoadTicket {
        self.loads.begin(LoadFamily::Patient, patient_id)
    }

    /// 写入患者加载结果；过期的请求返回 `Cancelled` 且不改变状态
    pub fn apply_patient(&mut self, ticket: &LoadTicket, outcome: Result<PatientInfo>) -> Result<()> {
        if !self.loads.complete(ticket) {
            debug!("Dropping stale patient load for {}", ticket.target());
            return Err(MaizhenError::Cancelled);
        }

        let mut patient = outcome.map_err(|e| {
            warn!("Load patient {} failed: {}", ticket.target(), e);
            e
        })?;
        if is_blank(&patient.gender) {
            patient.gender = PatientInfo::DEFAULT_GENDER.to_string();
        }
        if patient.id.is_none() {
            patient.id = Some(ticket.target());
        }

        self.reset_form();
        self.patient_info = patient;
        info!("Loaded patient {}", ticket.target());
        Ok(())
    }

    /// 加载患者，并重置病历、九宫格与分析
    pub async fn load_patient(&mut self, patient_id: i64) -> Result<()> {
        let ticket = self.begin_load_patient(patient_id);
        let records = Arc::clone(&self.records);
        let outcome = ticket.run(records.get_patient(patient_id)).await;
        self.apply_patient(&ticket, outcome)
    }

    pub fn begin_load_record(&mut self, record_id: i64) -> LoadTicket {
        self.loads.begin(LoadFamily::Record, record_id)
    }

    /// 写入病历加载结果；过期的请求返回 `Cancelled` 且不改变状态
    ///
    /// 只有旧版处方文本的病历会把文本解析为药物列表。无编辑权限时药物编辑器只读。
    pub fn apply_record(&mut self, ticket: &LoadTicket, outcome: Result<RecordDetail>) -> Result<()> {
        if !self.loads.complete(ticket) {
            debug!("Dropping stale record load for {}", ticket.target());
            return Err(MaizhenError::Cancelled);
        }

        let detail = outcome.map_err(|e| {
            warn!("Load record {} failed: {}", ticket.target(), e);
            e
        })?;
        let analysis = detail.analysis().cloned();

        if let Some(patient) = detail.patient_info {
            self.patient_info = patient;
        }
        if let Some(mut record) = detail.medical_record {
            let medicines = if record.medicines.is_empty() && !is_blank(&record.prescription) {
                text_to_medicines(&record.prescription)
            } else {
                std::mem::take(&mut record.medicines)
            };
            self.medicines.replace(medicines);
            self.medical_record = record;
        }
        if let Some(grid) = detail.pulse_grid {
            self.pulse.load(grid);
        }
        self.ai_analysis = analysis;

        self.permissions = detail.permissions.unwrap_or_default();
        self.medicines.set_read_only(!self.permissions.can_edit);
        self.record_id = Some(ticket.target());
        info!("Loaded record {}", ticket.target());
        Ok(())
    }

    /// 加载病历
    pub async fn load_record(&mut self, record_id: i64) -> Result<()> {
        let ticket = self.begin_load_record(record_id);
        let records = Arc::clone(&self.records);
        let outcome = ticket.run(records.get_record(record_id)).await;
        self.apply_record(&ticket, outcome)
    }

    // ---- 保存与删除 ----

    /// 保存病历
    ///
    /// 校验失败不发请求；保存失败时状态保持不变。成功后清空表单与草稿，
    /// 标注器有数据时顺带保存标注，标注保存失败不影响结果。
    pub async fn save(&mut self, annotator: Option<&dyn AnnotationSource>) -> Result<SaveReceipt> {
        let draft = assemble(
            &self.form(),
            annotator,
            self.preferences.practice_mode,
            &self.preferences.teacher,
        )?;

        let receipt = self.records.save_record(&draft).await.map_err(|e| {
            warn!("Save record failed: {}", e);
            e
        })?;
        info!("Record saved: {:?}", receipt.record_id);

        self.reset_form();
        self.clear_draft();
        self.last_update = Utc::now();

        if let Some(source) = annotator.filter(|a| a.has_data()) {
            if !source.save_annotation().await {
                warn!("Annotation was not saved alongside record {:?}", receipt.record_id);
            }
        }
        Ok(receipt)
    }

    /// 删除病历，成功后等同新建患者
    pub async fn delete_record(&mut self, record_id: i64) -> Result<()> {
        self.records.delete_record(record_id).await.map_err(|e| {
            warn!("Delete record {} failed: {}", record_id, e);
            e
        })?;
        info!("Record {} deleted", record_id);
        self.new_patient();
        self.last_update = Utc::now();
        Ok(())
    }

    // ---- AI分析 ----

    /// 生成AI分析
    ///
    /// 当前病历已保存过时，在后台回写分析结果，失败只记录日志。
    pub async fn analyze(&mut self) -> Result<AnalysisResult> {
        let form = self.form();
        let request = AnalysisRequest {
            pulse_grid: form.pulse_grid,
            medical_record: form.medical_record,
            patient_info: form.patient_info,
        };
        let result = self.analysis.generate_report(&request).await.map_err(|e| {
            warn!("Analysis failed: {}", e);
            e
        })?;
        self.ai_analysis = Some(result.clone());

        if let Some(record_id) = self.record_id {
            let records = Arc::clone(&self.records);
            let analysis = result.clone();
            self.background.retain(|handle| !handle.is_finished());
            self.background.push(tokio::spawn(async move {
                match records.update_analysis(record_id, &analysis).await {
                    Ok(()) => debug!("Analysis stored on record {}", record_id),
                    Err(e) => warn!("Failed to store analysis on record {}: {}", record_id, e),
                }
            }));
        }
        Ok(result)
    }

    /// 等待后台任务完成
    pub async fn wait_background(&mut self) {
        for handle in self.background.drain(..) {
            if let Err(e) = handle.await {
                warn!("Background task failed: {}", e);
            }
        }
    }

    // ---- 从标注器填入 ----

    /// 填入患者信息（非空字段覆盖），可选切回病历标签页
    pub fn fill_info(&mut self, draft: &PatientInfoDraft, switch_tab: bool) {
        overlay_patient_draft(&mut self.patient_info, &mut self.medical_record, draft);
        if switch_tab {
            self.set_shadowing_tab(ShadowingTab::Record);
        }
        self.mirror_draft();
    }

    /// 用标注得到的药物替换当前药物列表
    pub fn fill_prescription(&mut self, medicines: Vec<Medicine>) {
        if self.medicines.is_read_only() {
            warn!("Record is read-only, prescription not filled");
            return;
        }
        self.medical_record.prescription = medicines_to_text(&medicines);
        self.medicines.replace(medicines);
        self.set_shadowing_tab(ShadowingTab::Record);
        self.mirror_draft();
    }

    // ---- 偏好 ----

    fn save_preferences(&self) {
        if let Err(e) = self.store.save_preferences(&self.preferences) {
            warn!("Failed to save preferences: {}", e);
        }
    }

    pub fn set_practice_mode(&mut self, mode: PracticeMode) {
        self.preferences.practice_mode = mode;
        self.save_preferences();
    }

    pub fn set_shadowing_tab(&mut self, tab: ShadowingTab) {
        self.preferences.shadowing_tab = tab;
        self.save_preferences();
    }

    pub fn set_teacher(&mut self, teacher: impl Into<String>) {
        self.preferences.teacher = teacher.into();
        self.save_preferences();
    }

    /// 直接替换九宫格（例如从文件导入），不触发相似搜索
    pub fn load_pulse_grid(&mut self, grid: PulseGrid) {
        self.pulse.load(grid);
        self.mirror_draft();
    }
}
