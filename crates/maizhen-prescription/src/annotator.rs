//! 处方图片标注器
//!
//! 上传处方照片后，可以旋转图片、在图片上画框标出每味药、拖动或删除框，
//! 并调用识别服务提取患者信息。父级通过 [`AnnotationSource`] 读取结果。
//!
//! 状态：无图片 → 选择文件（校验类型与大小）→ 已加载。旋转会生成新图片并
//! 清空所有框；清除会回到无图片并释放图片句柄。

use async_trait::async_trait;
use maizhen_client::PrescriptionApi;
use maizhen_config::AnnotatorConfig;
use maizhen_core::{
    AnnotationPayload, EntryId, ImageUpload, MaizhenError, Medicine, MedicineBoxRecord,
    PatientInfoDraft, RecognitionResponse, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::geometry::{hit_test, AnnotationBox, Point, Rect};
use crate::raster::{rotate_clockwise, ImageLease, ImageRegistry};

/// 画框预览的最小显示宽度
const PREVIEW_MIN_WIDTH: f64 = 0.5;

/// 父级读取标注结果的接口
#[async_trait]
pub trait AnnotationSource: Send + Sync {
    /// 已填写药名的框对应的药物，ID与框相同
    fn medicines(&self) -> Vec<Medicine>;

    /// 患者信息，附带跟诊心得
    fn patient_info(&self) -> PatientInfoDraft;

    /// 有框或已有患者姓名
    fn has_data(&self) -> bool;

    /// 保存图片与标注，失败只记录日志并返回 false
    async fn save_annotation(&self) -> bool;
}

/// 每个框关联的药物
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoxMedicine {
    pub name: String,
    pub dosage: String,
}

/// 患者信息中可编辑的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientField {
    Name,
    Gender,
    Age,
    Phone,
    Date,
    Diagnosis,
}

/// 当前指针手势，同一时间最多一个
#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Drawing { anchor: Point, current: Point },
    Moving { id: EntryId, offset: Point },
}

/// 一次识别请求，结果需带着同一个代数交回
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub generation: u64,
    pub image: ImageUpload,
}

/// 处方图片标注器
pub struct PrescriptionAnnotator {
    api: Arc<dyn PrescriptionApi>,
    config: AnnotatorConfig,
    registry: ImageRegistry,
    image: Option<ImageLease>,
    boxes: Vec<AnnotationBox>,
    medicine_data: HashMap<EntryId, BoxMedicine>,
    patient_info: PatientInfoDraft,
    experience: String,
    gesture: Gesture,
    recognizing: bool,
    // 换图、旋转或清除时递增，旧图片的识别结果据此丢弃
    generation: u64,
    recognized: bool,
    is_mock: bool,
    api_error: Option<String>,
    saving: AtomicBool,
}

impl PrescriptionAnnotator {
    pub fn new(api: Arc<dyn PrescriptionApi>, config: AnnotatorConfig) -> Self {
        Self::with_registry(api, config, ImageRegistry::new())
    }

    /// 使用外部的图片句柄计数器
    pub fn with_registry(
        api: Arc<dyn PrescriptionApi>,
        config: AnnotatorConfig,
        registry: ImageRegistry,
    ) -> Self {
        Self {
            api,
            config,
            registry,
            image: None,
            boxes: Vec::new(),
            medicine_data: HashMap::new(),
            patient_info: PatientInfoDraft::default(),
            experience: String::new(),
            gesture: Gesture::Idle,
            recognizing: false,
            generation: 0,
            recognized: false,
            is_mock: false,
            api_error: None,
            saving: AtomicBool::new(false),
        }
    }

    // ---- 图片 ----

    /// 选择或拖入图片
    ///
    /// 类型或大小不合规时返回校验错误并保持原状态；成功后清空之前的
    /// 识别结果、框与药物。
    pub fn select_file(&mut self, upload: ImageUpload) -> Result<()> {
        if !self.config.allowed_mime_types.iter().any(|m| *m == upload.mime_type) {
            return Err(MaizhenError::Validation("仅支持 JPEG、PNG、WebP、BMP 格式".to_string()));
        }
        if upload.bytes.len() > self.config.max_image_bytes {
            return Err(MaizhenError::Validation(format!(
                "图片大小不能超过 {}MB",
                self.config.max_image_bytes / (1024 * 1024)
            )));
        }

        info!("Prescription image selected: {} ({} bytes)", upload.file_name, upload.bytes.len());
        self.reset();
        self.image = Some(self.registry.lease(upload));
        Ok(())
    }

    /// 清除图片并回到初始状态
    pub fn clear(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.image = None;
        self.generation += 1;
        self.recognizing = false;
        self.patient_info = PatientInfoDraft::default();
        self.experience.clear();
        self.recognized = false;
        self.is_mock = false;
        self.api_error = None;
        self.boxes.clear();
        self.medicine_data.clear();
        self.gesture = Gesture::Idle;
    }

    /// 顺时针旋转90度
    ///
    /// 框坐标是相对图片的百分比，旋转后宽高互换，原有框全部作废。
    pub fn rotate_clockwise(&mut self) -> Result<()> {
        let Some(current) = self.image.as_ref() else {
            return Ok(());
        };
        let rotated = rotate_clockwise(current.upload(), self.config.rotate_jpeg_quality)?;

        // 先释放旧图片再登记新图片
        self.image = None;
        self.image = Some(self.registry.lease(rotated));
        self.generation += 1;
        self.recognizing = false;
        self.boxes.clear();
        self.medicine_data.clear();
        self.gesture = Gesture::Idle;
        debug!("Prescription image rotated, annotations reset");
        Ok(())
    }

    pub fn image(&self) -> Option<&ImageUpload> {
        self.image.as_ref().map(ImageLease::upload)
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    // ---- 识别 ----

    /// 开始识别，返回要上传的图片
    ///
    /// 识别进行中不允许再次触发。
    pub fn begin_recognition(&mut self) -> Result<RecognitionRequest> {
        if self.recognizing {
            return Err(MaizhenError::InvalidStateTransition {
                from: "recognizing".to_string(),
                event: "recognize".to_string(),
            });
        }
        let image = self
            .image()
            .cloned()
            .ok_or_else(|| MaizhenError::Validation("请先上传处方图片".to_string()))?;
        self.recognizing = true;
        self.api_error = None;
        Ok(RecognitionRequest {
            generation: self.generation,
            image,
        })
    }

    /// 记录识别结果
    ///
    /// 发起后图片已被替换、旋转或清除时丢弃结果并返回 false。
    pub fn finish_recognition(&mut self, generation: u64, outcome: Result<RecognitionResponse>) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding recognition for outdated image (generation {}, current {})",
                generation, self.generation
            );
            return false;
        }
        self.recognizing = false;
        match outcome {
            Ok(response) => {
                self.patient_info = response.patient_info;
                self.recognized = true;
                self.is_mock = response.mock;
                match (&response.error, &response.method) {
                    (Some(err), method) => {
                        let method = method.as_deref().unwrap_or_default();
                        warn!("Recognition reported soft error via {}: {}", method, err);
                        self.api_error = Some(format!("[{}] {}", method, err));
                    }
                    (None, Some(method)) => debug!("OCR method: {}", method),
                    (None, None) => {}
                }
            }
            Err(MaizhenError::Server { status, message }) => {
                error!("Recognition failed with HTTP {}", status);
                self.api_error = Some(format!("HTTP {}: {}", status, message));
            }
            Err(e) => {
                error!("Recognition failed: {}", e);
                self.api_error = Some(e.to_string());
            }
        }
        true
    }

    /// 调用识别服务
    pub async fn recognize(&mut self) -> Result<()> {
        let request = self.begin_recognition()?;
        let api = Arc::clone(&self.api);
        let outcome = api.recognize(&request.image).await;
        self.finish_recognition(request.generation, outcome);
        Ok(())
    }

    pub fn is_recognizing(&self) -> bool {
        self.recognizing
    }

    pub fn is_recognized(&self) -> bool {
        self.recognized
    }

    /// 识别服务使用了兜底的模拟结果
    pub fn is_mock(&self) -> bool {
        self.is_mock
    }

    pub fn api_error(&self) -> Option<&str> {
        self.api_error.as_deref()
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    // ---- 指针手势 ----

    /// 按下指针：落在已有框内开始移动，否则开始画框。非主键忽略。
    pub fn pointer_down(&mut self, point: Point, primary: bool) {
        if !primary || self.image.is_none() {
            return;
        }
        self.gesture = match hit_test(&self.boxes, point) {
            Some(index) => {
                let rect = self.boxes[index].rect;
                Gesture::Moving {
                    id: self.boxes[index].id,
                    offset: Point::new(point.x - rect.x, point.y - rect.y),
                }
            }
            None => Gesture::Drawing {
                anchor: point,
                current: point,
            },
        };
    }

    /// 移动指针：更新画框预览，或按记录的偏移移动框（不越界）
    pub fn pointer_move(&mut self, point: Point) {
        match &mut self.gesture {
            Gesture::Idle => {}
            Gesture::Drawing { current, .. } => *current = point,
            Gesture::Moving { id, offset } => {
                let (id, offset) = (*id, *offset);
                if let Some(target) = self.boxes.iter_mut().find(|b| b.id == id) {
                    target.rect = target.rect.moved_to(point.x - offset.x, point.y - offset.y);
                }
            }
        }
    }

    /// 松开指针：提交画框（宽高都超过阈值才生效）或结束移动
    ///
    /// 返回新建框的ID。
    pub fn pointer_up(&mut self) -> Option<EntryId> {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        let Gesture::Drawing { anchor, current } = gesture else {
            return None;
        };

        let rect = Rect::from_corners(anchor, current);
        if !rect.exceeds(self.config.min_box_size) {
            debug!("Discarding {:.2}x{:.2} gesture below threshold", rect.w, rect.h);
            return None;
        }
        let created = AnnotationBox::new(rect);
        self.boxes.push(created);
        Some(created.id)
    }

    /// 指针离开标注区域，与松开相同
    pub fn pointer_leave(&mut self) -> Option<EntryId> {
        self.pointer_up()
    }

    /// 画框中的实时预览，宽度太小时不显示
    pub fn draw_preview(&self) -> Option<Rect> {
        match self.gesture {
            Gesture::Drawing { anchor, current } => {
                let rect = Rect::from_corners(anchor, current);
                (rect.w > PREVIEW_MIN_WIDTH).then_some(rect)
            }
            _ => None,
        }
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    // ---- 框与药物 ----

    pub fn boxes(&self) -> &[AnnotationBox] {
        &self.boxes
    }

    /// 带显示序号（从1开始，按当前列表位置）的框
    pub fn numbered_boxes(&self) -> impl Iterator<Item = (usize, &AnnotationBox)> {
        self.boxes.iter().enumerate().map(|(i, b)| (i + 1, b))
    }

    /// 删除框及其药物
    pub fn delete_box(&mut self, id: EntryId) -> bool {
        let before = self.boxes.len();
        self.boxes.retain(|b| b.id != id);
        self.medicine_data.remove(&id);
        if matches!(self.gesture, Gesture::Moving { id: moving, .. } if moving == id) {
            self.gesture = Gesture::Idle;
        }
        before != self.boxes.len()
    }

    fn box_entry(&mut self, id: EntryId) -> Option<&mut BoxMedicine> {
        if !self.boxes.iter().any(|b| b.id == id) {
            warn!("Annotation box {} not found", id);
            return None;
        }
        Some(self.medicine_data.entry(id).or_default())
    }

    pub fn set_box_name(&mut self, id: EntryId, name: impl Into<String>) {
        if let Some(entry) = self.box_entry(id) {
            entry.name = name.into();
        }
    }

    pub fn set_box_dosage(&mut self, id: EntryId, dosage: impl Into<String>) {
        if let Some(entry) = self.box_entry(id) {
            entry.dosage = dosage.into();
        }
    }

    pub fn box_medicine(&self, id: EntryId) -> Option<&BoxMedicine> {
        self.medicine_data.get(&id)
    }

    // ---- 患者信息 ----

    pub fn set_patient_field(&mut self, field: PatientField, value: impl Into<String>) {
        let value = value.into();
        let info = &mut self.patient_info;
        match field {
            PatientField::Name => info.name = value,
            PatientField::Gender => info.gender = value,
            PatientField::Age => info.age = value,
            PatientField::Phone => info.phone = value,
            PatientField::Date => info.date = value,
            PatientField::Diagnosis => info.diagnosis = value,
        }
    }

    pub fn set_experience(&mut self, experience: impl Into<String>) {
        self.experience = experience.into();
    }

    pub fn experience(&self) -> &str {
        &self.experience
    }

    /// 保存标注的载荷，框按当前顺序编号
    pub fn annotation_payload(&self) -> AnnotationPayload {
        let medicine_boxes = self
            .numbered_boxes()
            .map(|(seq, b)| {
                let data = self.medicine_data.get(&b.id).cloned().unwrap_or_default();
                MedicineBoxRecord {
                    id: b.id,
                    x: b.rect.x,
                    y: b.rect.y,
                    w: b.rect.w,
                    h: b.rect.h,
                    seq,
                    name: data.name,
                    dosage: data.dosage,
                }
            })
            .collect();

        AnnotationPayload {
            patient_info: self.patient_info.clone(),
            experience: self.experience.clone(),
            medicine_boxes,
        }
    }
}

#[async_trait]
impl AnnotationSource for PrescriptionAnnotator {
    fn medicines(&self) -> Vec<Medicine> {
        self.boxes
            .iter()
            .filter_map(|b| {
                let data = self.medicine_data.get(&b.id)?;
                let name = data.name.trim();
                if name.is_empty() {
                    return None;
                }
                Some(Medicine {
                    id: b.id,
                    name: name.to_string(),
                    dosage: data.dosage.trim().to_string(),
                })
            })
            .collect()
    }

    fn patient_info(&self) -> PatientInfoDraft {
        PatientInfoDraft {
            experience: self.experience.clone(),
            ..self.patient_info.clone()
        }
    }

    fn has_data(&self) -> bool {
        !self.boxes.is_empty() || !self.patient_info.name.is_empty()
    }

    async fn save_annotation(&self) -> bool {
        let Some(image) = self.image().cloned() else {
            return false;
        };
        let payload = self.annotation_payload();

        self.saving.store(true, Ordering::SeqCst);
        let outcome = self.api.save_annotation(&image, &payload).await;
        self.saving.store(false, Ordering::SeqCst);

        match outcome {
            Ok(()) => {
                info!("Annotation saved with {} boxes", payload.medicine_boxes.len());
                true
            }
            Err(e) => {
                error!("Failed to save annotation: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ROTATED_FILE_NAME;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePrescriptionApi {
        response: Mutex<Option<Result<RecognitionResponse>>>,
        saved: Mutex<Vec<AnnotationPayload>>,
        fail_save: bool,
    }

    #[async_trait]
    impl PrescriptionApi for FakePrescriptionApi {
        async fn recognize(&self, _image: &ImageUpload) -> Result<RecognitionResponse> {
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(RecognitionResponse::default()))
        }

        async fn save_annotation(&self, _image: &ImageUpload, annotations: &AnnotationPayload) -> Result<()> {
            if self.fail_save {
                return Err(MaizhenError::Network("connection refused".to_string()));
            }
            self.saved.lock().unwrap().push(annotations.clone());
            Ok(())
        }
    }

    fn png(width: u32, height: u32) -> ImageUpload {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        ImageUpload {
            file_name: "rx.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes,
        }
    }

    fn annotator_with(api: Arc<FakePrescriptionApi>) -> PrescriptionAnnotator {
        let mut annotator = PrescriptionAnnotator::new(api, AnnotatorConfig::default());
        annotator.select_file(png(8, 4)).unwrap();
        annotator
    }

    fn annotator() -> PrescriptionAnnotator {
        annotator_with(Arc::new(FakePrescriptionApi::default()))
    }

    fn draw(annotator: &mut PrescriptionAnnotator, from: (f64, f64), to: (f64, f64)) -> Option<EntryId> {
        annotator.pointer_down(Point::new(from.0, from.1), true);
        annotator.pointer_move(Point::new(to.0, to.1));
        annotator.pointer_up()
    }

    #[test]
    fn test_select_file_validation() {
        let mut annotator =
            PrescriptionAnnotator::new(Arc::new(FakePrescriptionApi::default()), AnnotatorConfig::default());

        let gif = ImageUpload {
            file_name: "rx.gif".to_string(),
            mime_type: "image/gif".to_string(),
            bytes: vec![0; 10],
        };
        let err = annotator.select_file(gif).unwrap_err();
        assert!(err.to_string().contains("仅支持 JPEG、PNG、WebP、BMP 格式"));
        assert!(!annotator.has_image());

        let huge = ImageUpload {
            file_name: "rx.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![0; 10 * 1024 * 1024 + 1],
        };
        let err = annotator.select_file(huge).unwrap_err();
        assert!(err.to_string().contains("图片大小不能超过 10MB"));
        assert!(!annotator.has_image());

        let exact = ImageUpload {
            file_name: "rx.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![0; 10 * 1024 * 1024],
        };
        assert!(annotator.select_file(exact).is_ok());
    }

    #[test]
    fn test_box_commit_threshold() {
        let mut annotator = annotator();
        assert_eq!(draw(&mut annotator, (10.0, 10.0), (11.0, 11.0)), None);
        assert!(annotator.boxes().is_empty());

        let id = draw(&mut annotator, (10.0, 10.0), (15.0, 16.0)).unwrap();
        assert_eq!(annotator.boxes().len(), 1);
        assert_eq!(annotator.boxes()[0].id, id);
        assert_eq!(annotator.boxes()[0].rect, Rect::new(10.0, 10.0, 5.0, 6.0));
        assert!(!annotator.is_gesture_active());
    }

    #[test]
    fn test_draw_in_reverse_direction() {
        let mut annotator = annotator();
        draw(&mut annotator, (40.0, 30.0), (20.0, 10.0)).unwrap();
        assert_eq!(annotator.boxes()[0].rect, Rect::new(20.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn test_move_keeps_offset_and_clamps() {
        let mut annotator = annotator();
        draw(&mut annotator, (10.0, 10.0), (30.0, 20.0)).unwrap();

        // 在框内偏移 (5, 5) 处按下
        annotator.pointer_down(Point::new(15.0, 15.0), true);
        annotator.pointer_move(Point::new(45.0, 35.0));
        assert_eq!(annotator.boxes()[0].rect, Rect::new(40.0, 30.0, 20.0, 10.0));

        annotator.pointer_move(Point::new(100.0, 15.0));
        assert_eq!(annotator.boxes()[0].rect.x, 80.0);
        assert_eq!(annotator.boxes()[0].rect.y, 10.0);
        assert_eq!(annotator.pointer_up(), None);
        assert_eq!(annotator.boxes().len(), 1);
    }

    #[test]
    fn test_pointer_leave_commits_draw() {
        let mut annotator = annotator();
        annotator.pointer_down(Point::new(50.0, 50.0), true);
        annotator.pointer_move(Point::new(60.0, 70.0));
        assert_eq!(annotator.draw_preview(), Some(Rect::new(50.0, 50.0, 10.0, 20.0)));
        assert!(annotator.pointer_leave().is_some());
        assert!(!annotator.is_gesture_active());
        assert_eq!(annotator.draw_preview(), None);
    }

    #[test]
    fn test_secondary_button_ignored() {
        let mut annotator = annotator();
        annotator.pointer_down(Point::new(50.0, 50.0), false);
        assert!(!annotator.is_gesture_active());
    }

    #[test]
    fn test_preview_hidden_when_narrow() {
        let mut annotator = annotator();
        annotator.pointer_down(Point::new(50.0, 50.0), true);
        annotator.pointer_move(Point::new(50.3, 70.0));
        assert_eq!(annotator.draw_preview(), None);
    }

    #[test]
    fn test_rotation_clears_boxes() {
        let mut annotator = annotator();
        let a = draw(&mut annotator, (10.0, 10.0), (20.0, 20.0)).unwrap();
        draw(&mut annotator, (50.0, 50.0), (60.0, 60.0)).unwrap();
        annotator.set_box_name(a, "甘草");
        assert_eq!(annotator.boxes().len(), 2);

        annotator.rotate_clockwise().unwrap();
        assert!(annotator.boxes().is_empty());
        assert!(annotator.box_medicine(a).is_none());
        let image = annotator.image().unwrap();
        assert_eq!(image.file_name, ROTATED_FILE_NAME);
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[test]
    fn test_image_handles_released() {
        let registry = ImageRegistry::new();
        let mut annotator = PrescriptionAnnotator::with_registry(
            Arc::new(FakePrescriptionApi::default()),
            AnnotatorConfig::default(),
            registry.clone(),
        );
        annotator.select_file(png(4, 4)).unwrap();
        assert_eq!(registry.live_count(), 1);
        annotator.rotate_clockwise().unwrap();
        assert_eq!(registry.live_count(), 1);
        annotator.select_file(png(4, 4)).unwrap();
        assert_eq!(registry.live_count(), 1);
        annotator.clear();
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_delete_box_removes_medicine_and_renumbers() {
        let mut annotator = annotator();
        let a = draw(&mut annotator, (0.0, 0.0), (10.0, 10.0)).unwrap();
        let b = draw(&mut annotator, (20.0, 20.0), (30.0, 30.0)).unwrap();
        let c = draw(&mut annotator, (40.0, 40.0), (50.0, 50.0)).unwrap();
        annotator.set_box_name(a, "黄芪");

        assert!(annotator.delete_box(a));
        assert!(annotator.box_medicine(a).is_none());
        let numbering: Vec<(usize, EntryId)> =
            annotator.numbered_boxes().map(|(n, bx)| (n, bx.id)).collect();
        assert_eq!(numbering, vec![(1, b), (2, c)]);
        assert!(!annotator.delete_box(a));
    }

    #[test]
    fn test_medicines_trimmed_and_filtered() {
        let mut annotator = annotator();
        let a = draw(&mut annotator, (0.0, 0.0), (10.0, 10.0)).unwrap();
        let b = draw(&mut annotator, (20.0, 20.0), (30.0, 30.0)).unwrap();
        draw(&mut annotator, (40.0, 40.0), (50.0, 50.0)).unwrap();
        annotator.set_box_name(a, " 黄芪 ");
        annotator.set_box_dosage(a, "30 ");
        annotator.set_box_name(b, "   ");
        annotator.set_box_name(EntryId::new(), "无效");

        let medicines = annotator.medicines();
        assert_eq!(medicines.len(), 1);
        assert_eq!(medicines[0].id, a);
        assert_eq!(medicines[0].name, "黄芪");
        assert_eq!(medicines[0].dosage, "30");
    }

    #[test]
    fn test_has_data_and_patient_info() {
        let mut annotator = annotator();
        assert!(!annotator.has_data());
        annotator.set_patient_field(PatientField::Name, "李四");
        annotator.set_patient_field(PatientField::Diagnosis, "胃脘痛");
        annotator.set_experience("老师以和胃为主");
        assert!(annotator.has_data());

        let info = annotator.patient_info();
        assert_eq!(info.name, "李四");
        assert_eq!(info.diagnosis, "胃脘痛");
        assert_eq!(info.experience, "老师以和胃为主");

        annotator.set_patient_field(PatientField::Name, "");
        assert!(!annotator.has_data());
        draw(&mut annotator, (0.0, 0.0), (10.0, 10.0)).unwrap();
        assert!(annotator.has_data());
    }

    #[tokio::test]
    async fn test_recognize_success_and_soft_error() {
        let api = Arc::new(FakePrescriptionApi::default());
        *api.response.lock().unwrap() = Some(Ok(RecognitionResponse {
            patient_info: PatientInfoDraft {
                name: "王五".to_string(),
                ..Default::default()
            },
            mock: true,
            method: Some("tesseract".to_string()),
            error: Some("timeout".to_string()),
        }));

        let mut annotator = annotator_with(Arc::clone(&api));
        annotator.recognize().await.unwrap();
        assert!(annotator.is_recognized());
        assert!(!annotator.is_recognizing());
        assert!(annotator.is_mock());
        assert_eq!(annotator.api_error(), Some("[tesseract] timeout"));
        assert_eq!(annotator.patient_info().name, "王五");
    }

    #[tokio::test]
    async fn test_recognize_server_error() {
        let api = Arc::new(FakePrescriptionApi::default());
        *api.response.lock().unwrap() = Some(Err(MaizhenError::Server {
            status: 502,
            message: "bad gateway".to_string(),
        }));

        let mut annotator = annotator_with(Arc::clone(&api));
        annotator.recognize().await.unwrap();
        assert!(!annotator.is_recognized());
        assert_eq!(annotator.api_error(), Some("HTTP 502: bad gateway"));
    }

    #[test]
    fn test_recognition_not_reentrant() {
        let mut annotator = annotator();
        let request = annotator.begin_recognition().unwrap();
        assert!(annotator.is_recognizing());
        assert!(matches!(
            annotator.begin_recognition(),
            Err(MaizhenError::InvalidStateTransition { .. })
        ));
        assert!(annotator.finish_recognition(request.generation, Ok(RecognitionResponse::default())));
        assert!(!annotator.is_recognizing());
        assert!(annotator.begin_recognition().is_ok());
    }

    fn recognized_as(name: &str) -> Result<RecognitionResponse> {
        Ok(RecognitionResponse {
            patient_info: PatientInfoDraft {
                name: name.to_string(),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_result_for_replaced_image_dropped() {
        let mut annotator = annotator();
        let stale = annotator.begin_recognition().unwrap();

        annotator.select_file(png(6, 6)).unwrap();
        assert!(!annotator.is_recognizing());
        let current = annotator.begin_recognition().unwrap();

        assert!(!annotator.finish_recognition(stale.generation, recognized_as("旧图")));
        assert!(annotator.is_recognizing());
        assert!(!annotator.is_recognized());

        assert!(annotator.finish_recognition(current.generation, recognized_as("新图")));
        assert_eq!(annotator.patient_info().name, "新图");
    }

    #[test]
    fn test_result_after_rotation_dropped() {
        let mut annotator = annotator();
        let stale = annotator.begin_recognition().unwrap();
        annotator.rotate_clockwise().unwrap();

        assert!(!annotator.finish_recognition(stale.generation, recognized_as("旋转前")));
        assert!(annotator.patient_info().name.is_empty());
        assert!(annotator.begin_recognition().is_ok());
    }

    #[test]
    fn test_recognize_without_image() {
        let mut annotator =
            PrescriptionAnnotator::new(Arc::new(FakePrescriptionApi::default()), AnnotatorConfig::default());
        assert!(matches!(annotator.begin_recognition(), Err(MaizhenError::Validation(_))));
    }

    #[tokio::test]
    async fn test_save_annotation_sequence_numbers() {
        let api = Arc::new(FakePrescriptionApi::default());
        let mut annotator = annotator_with(Arc::clone(&api));
        let a = draw(&mut annotator, (0.0, 0.0), (10.0, 10.0)).unwrap();
        draw(&mut annotator, (20.0, 20.0), (30.0, 30.0)).unwrap();
        annotator.set_box_name(a, "甘草");
        annotator.set_box_dosage(a, "6");
        annotator.set_experience("心得");

        assert!(annotator.save_annotation().await);
        assert!(!annotator.is_saving());

        let saved = api.saved.lock().unwrap();
        let payload = &saved[0];
        assert_eq!(payload.experience, "心得");
        assert_eq!(payload.medicine_boxes.len(), 2);
        assert_eq!(payload.medicine_boxes[0].seq, 1);
        assert_eq!(payload.medicine_boxes[0].name, "甘草");
        assert_eq!(payload.medicine_boxes[1].seq, 2);
        assert!(payload.medicine_boxes[1].name.is_empty());
    }

    #[tokio::test]
    async fn test_save_annotation_failure_returns_false() {
        let api = Arc::new(FakePrescriptionApi {
            fail_save: true,
            ..Default::default()
        });
        let annotator = annotator_with(api);
        assert!(!annotator.save_annotation().await);

        let empty =
            PrescriptionAnnotator::new(Arc::new(FakePrescriptionApi::default()), AnnotatorConfig::default());
        assert!(!empty.save_annotation().await);
    }
}
